//! Third-octave band table and A-weighting offsets.
//!
//! Bands are keyed by their nominal centre frequency (IEC 61260 labels such as
//! 31.5 Hz). Band edges are computed from the exact base-2 midband frequency
//! `1000·2^(k/3)` and the half-bandwidth factor `2^(1/6)`, so adjacent bands
//! share their edges and the band set tiles the spectrum without gaps.

use serde::{Deserialize, Serialize};

/// Nominal third-octave centre frequencies, 16 Hz to 20 kHz.
pub const THIRD_OCTAVE_NOMINAL: [f64; 32] = [
    16.0, 20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0,
    400.0, 500.0, 630.0, 800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0,
    6300.0, 8000.0, 10000.0, 12500.0, 16000.0, 20000.0,
];

/// A-weighting offsets (dB) matching [`THIRD_OCTAVE_NOMINAL`] one to one.
pub const A_WEIGHTING_DB: [f64; 32] = [
    -56.7, -50.5, -44.7, -39.4, -34.6, -30.2, -26.2, -22.5, -19.1, -16.1, -13.4, -10.9, -8.6,
    -6.6, -4.8, -3.2, -1.9, -0.8, 0.0, 0.6, 1.0, 1.2, 1.3, 1.2, 1.0, 0.5, -0.1, -1.1, -2.5, -4.3,
    -6.6, -9.3,
];

/// Index of the 1 kHz reference band in [`THIRD_OCTAVE_NOMINAL`].
const REFERENCE_BAND: usize = 18;

/// Index of the first band of the reduced (100 Hz and up) set.
const REDUCED_FIRST_BAND: usize = 8;

/// `2^(1/6)`: ratio between a band centre and either edge.
pub const HALF_BAND_FACTOR: f64 = 1.122_462_048_309_373;

/// Which portion of the band table a consumer analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandSet {
    /// 16 Hz to 20 kHz; needs long windows for the lowest bands to hold any bin.
    Full,
    /// 100 Hz to 20 kHz; suitable for short (125 ms) windows.
    Reduced,
}

impl BandSet {
    pub fn nominal(self) -> &'static [f64] {
        match self {
            BandSet::Full => &THIRD_OCTAVE_NOMINAL,
            BandSet::Reduced => &THIRD_OCTAVE_NOMINAL[REDUCED_FIRST_BAND..],
        }
    }
}

/// Nominal centre frequencies of `set` not above `max_frequency`.
pub fn center_frequencies(set: BandSet, max_frequency: f64) -> Vec<f64> {
    set.nominal()
        .iter()
        .copied()
        .take_while(|&f| f <= max_frequency)
        .collect()
}

fn band_index(nominal: f64) -> Option<usize> {
    THIRD_OCTAVE_NOMINAL
        .iter()
        .position(|&f| (f - nominal).abs() < 1e-6)
}

/// A-weighting offset for a nominal centre frequency.
pub fn a_weighting(nominal: f64) -> Option<f64> {
    band_index(nominal).map(|i| A_WEIGHTING_DB[i])
}

/// Exact base-2 midband frequency for a nominal centre frequency.
pub fn exact_center_frequency(nominal: f64) -> Option<f64> {
    band_index(nominal)
        .map(|i| 1000.0 * 2f64.powf((i as f64 - REFERENCE_BAND as f64) / 3.0))
}

/// Lower and upper band edges (Hz).
pub fn band_edges(nominal: f64) -> Option<(f64, f64)> {
    exact_center_frequency(nominal).map(|fc| (fc / HALF_BAND_FACTOR, fc * HALF_BAND_FACTOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn half_band_factor_is_sixth_root_of_two() {
        assert_abs_diff_eq!(HALF_BAND_FACTOR, 2f64.powf(1.0 / 6.0), epsilon = 1e-12);
    }

    #[test]
    fn reference_band_is_one_kilohertz() {
        assert_eq!(THIRD_OCTAVE_NOMINAL[REFERENCE_BAND], 1000.0);
        assert_eq!(a_weighting(1000.0), Some(0.0));
        assert_abs_diff_eq!(exact_center_frequency(1000.0).unwrap(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn adjacent_bands_share_edges() {
        for pair in THIRD_OCTAVE_NOMINAL.windows(2) {
            let (_, upper) = band_edges(pair[0]).unwrap();
            let (lower, _) = band_edges(pair[1]).unwrap();
            assert_abs_diff_eq!(upper, lower, epsilon = 1e-9);
        }
    }

    #[test]
    fn reduced_set_starts_at_100_hz_and_caps_at_limit() {
        let freqs = center_frequencies(BandSet::Reduced, 16_000.0);
        assert_eq!(freqs.first().copied(), Some(100.0));
        assert_eq!(freqs.last().copied(), Some(16_000.0));
        assert_eq!(freqs.len(), 23);
        assert_eq!(center_frequencies(BandSet::Full, 22_050.0).len(), 32);
    }

    #[test]
    fn unknown_frequency_has_no_weighting() {
        assert_eq!(a_weighting(1001.0), None);
        assert_eq!(a_weighting(31.5), Some(-39.4));
    }
}
