//! Spectral analysis: windowed FFT, third-octave band integration and the
//! window/overlap controller that decides when an analysis runs.

mod engine;
mod overlap;
mod windowing;

pub use engine::SpectralEngine;
pub use overlap::{WindowController, WindowedResult};
pub use windowing::{hann, tukey, WindowType, TUKEY_ALPHA};

use serde::{Deserialize, Serialize};

use crate::acoustics::{db_to_energy, energy_to_db, LEVEL_FLOOR_DB};

/// Output of one spectral evaluation. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// Calibrated level of every FFT bin up to the fine-spectrum limit (dB).
    pub fine_spectrum: Vec<f32>,
    /// One level per configured centre frequency (dB). Empty when band
    /// levels were not requested.
    pub band_levels: Vec<f64>,
    /// Energetic sum of the band levels (dB).
    pub global_level: f64,
}

fn mean_level(levels: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = levels.fold((0.0, 0usize), |(sum, n), l| (sum + db_to_energy(l), n + 1));
    if n == 0 {
        LEVEL_FLOOR_DB
    } else {
        energy_to_db(sum / n as f64)
    }
}

/// Energy-domain average of several results, element by element.
///
/// Output lengths follow the newest (last) result.
pub fn energetic_average(results: &[ProcessingResult]) -> Option<ProcessingResult> {
    let newest = results.last()?;
    if results.len() == 1 {
        return Some(newest.clone());
    }
    let fine_spectrum = (0..newest.fine_spectrum.len())
        .map(|i| {
            mean_level(
                results
                    .iter()
                    .filter_map(|r| r.fine_spectrum.get(i).map(|&v| v as f64)),
            ) as f32
        })
        .collect();
    let band_levels = (0..newest.band_levels.len())
        .map(|i| mean_level(results.iter().filter_map(|r| r.band_levels.get(i).copied())))
        .collect();
    let global_level = mean_level(results.iter().map(|r| r.global_level));
    Some(ProcessingResult {
        fine_spectrum,
        band_levels,
        global_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn result(level: f64) -> ProcessingResult {
        ProcessingResult {
            fine_spectrum: vec![level as f32; 4],
            band_levels: vec![level; 3],
            global_level: level,
        }
    }

    #[test]
    fn average_of_nothing_is_none() {
        assert!(energetic_average(&[]).is_none());
    }

    #[test]
    fn average_is_energy_weighted() {
        let avg = energetic_average(&[result(60.0), result(70.0)]).unwrap();
        let expected = 10.0 * ((1e6 + 1e7) / 2.0f64).log10();
        assert_abs_diff_eq!(avg.global_level, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(avg.band_levels[2], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(avg.fine_spectrum[0] as f64, expected, epsilon = 1e-3);
    }

    #[test]
    fn averaging_floor_levels_stays_at_floor() {
        let avg = energetic_average(&[result(LEVEL_FLOOR_DB), result(LEVEL_FLOOR_DB)]).unwrap();
        assert_eq!(avg.global_level, LEVEL_FLOOR_DB);
    }
}
