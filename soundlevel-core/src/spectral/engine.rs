use std::ops::Range;
use std::sync::Arc;

use rustfft::{num_complex::Complex, FftPlanner};

use super::windowing::{WindowTable, WindowType};
use super::ProcessingResult;
use crate::acoustics::bands::{a_weighting, band_edges};
use crate::acoustics::{energetic_sum, i16_to_unit, rms_to_db, LEVEL_FLOOR_DB};
use crate::error::{Result, SoundLevelError};

#[derive(Debug, Clone)]
struct BandBins {
    bins: Range<usize>,
    a_weighting: f64,
}

/// FFT analysis of fixed-length windows into calibrated third-octave levels.
///
/// One engine per consumer: it owns its FFT plan, window tables and scratch
/// buffers, so two consumers never share analysis state.
pub struct SpectralEngine {
    sample_rate: u32,
    window_len: usize,
    db_fs_reference: f64,
    center_frequencies: Vec<f64>,
    bands: Vec<BandBins>,
    fine_len: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    bin_energy: Vec<f64>,
    rectangular: WindowTable,
    hann: WindowTable,
    tukey: WindowTable,
}

impl SpectralEngine {
    /// `center_frequencies` are nominal third-octave centres, ascending.
    pub fn new(
        sample_rate: u32,
        window_len: usize,
        center_frequencies: Vec<f64>,
        db_fs_reference: f64,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SoundLevelError::InvalidConfig("sample rate must be > 0".into()));
        }
        if window_len < 2 {
            return Err(SoundLevelError::InvalidConfig(format!(
                "analysis window of {window_len} samples is too short"
            )));
        }
        if !db_fs_reference.is_finite() {
            return Err(SoundLevelError::InvalidConfig(
                "dB-FS reference must be finite".into(),
            ));
        }

        let half = window_len / 2;
        let bin_width = sample_rate as f64 / window_len as f64;
        let bands = center_frequencies
            .iter()
            .map(|&nominal| {
                let (lower, upper) = band_edges(nominal).ok_or_else(|| {
                    SoundLevelError::InvalidConfig(format!(
                        "{nominal} Hz is not a third-octave centre frequency"
                    ))
                })?;
                let first = ((lower / bin_width).ceil() as usize).min(half);
                let last = ((upper / bin_width).floor() as usize).min(half - 1);
                Ok(BandBins {
                    bins: first..(last + 1).max(first),
                    a_weighting: a_weighting(nominal).unwrap_or(0.0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let spectrum_limit = center_frequencies
            .last()
            .copied()
            .unwrap_or(f64::MAX)
            .min(sample_rate as f64 / 2.0);
        let fine_len = ((spectrum_limit / bin_width) as usize).min(half);

        let fft = FftPlanner::<f32>::new().plan_fft_forward(window_len);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        tracing::debug!(
            sample_rate,
            window_len,
            bands = bands.len(),
            fine_len,
            "spectral engine ready"
        );

        Ok(Self {
            sample_rate,
            window_len,
            db_fs_reference,
            center_frequencies,
            bands,
            fine_len,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); window_len],
            scratch,
            bin_energy: vec![0.0; half],
            rectangular: WindowTable::new(WindowType::Rectangular, window_len),
            hann: WindowTable::new(WindowType::Hann, window_len),
            tukey: WindowTable::new(WindowType::Tukey, window_len),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn window_duration_secs(&self) -> f64 {
        self.window_len as f64 / self.sample_rate as f64
    }

    /// Width of one FFT bin (Hz).
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.window_len as f64
    }

    pub fn center_frequencies(&self) -> &[f64] {
        &self.center_frequencies
    }

    pub fn db_fs_reference(&self) -> f64 {
        self.db_fs_reference
    }

    /// Number of bins emitted in [`ProcessingResult::fine_spectrum`].
    pub fn fine_spectrum_len(&self) -> usize {
        self.fine_len
    }

    /// Analyse one window.
    ///
    /// Exactly `window_len` samples are used; extra samples are ignored and a
    /// shorter slice is rejected with [`SoundLevelError::WindowLength`].
    /// Without band levels the global level covers every FFT bin, unweighted.
    pub fn process(
        &mut self,
        samples: &[i16],
        window_type: WindowType,
        apply_weighting: bool,
        compute_band_levels: bool,
    ) -> Result<ProcessingResult> {
        if samples.len() < self.window_len {
            return Err(SoundLevelError::WindowLength {
                expected: self.window_len,
                actual: samples.len(),
            });
        }

        let table = match window_type {
            WindowType::Rectangular => &self.rectangular,
            WindowType::Hann => &self.hann,
            WindowType::Tukey => &self.tukey,
        };
        for (i, (slot, &s)) in self.buffer.iter_mut().zip(samples).enumerate() {
            *slot = Complex::new(i16_to_unit(s) * table.weight(i), 0.0);
        }
        let correction = table.energy_correction();
        let gain = correction * correction;

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Mean-square contribution of each one-sided bin; DC appears once,
        // every other bin stands for its negative-frequency twin too.
        let norm = 1.0 / (self.window_len as f64 * self.window_len as f64);
        for (k, energy) in self.bin_energy.iter_mut().enumerate() {
            let sq = self.buffer[k].norm_sqr() as f64 * norm * gain;
            *energy = if k == 0 { sq } else { 2.0 * sq };
        }

        let db_fs = self.db_fs_reference;
        let level_of = |mean_square: f64| rms_to_db(mean_square.sqrt(), db_fs);

        let fine_spectrum = self.bin_energy[..self.fine_len]
            .iter()
            .map(|&e| level_of(e) as f32)
            .collect();

        let (band_levels, global_level) = if compute_band_levels {
            let levels: Vec<f64> = self
                .bands
                .iter()
                .map(|band| {
                    let mean_square: f64 = self.bin_energy[band.bins.clone()].iter().sum();
                    if mean_square <= 0.0 {
                        return LEVEL_FLOOR_DB;
                    }
                    let level = level_of(mean_square);
                    if apply_weighting {
                        (level + band.a_weighting).max(LEVEL_FLOOR_DB)
                    } else {
                        level
                    }
                })
                .collect();
            let global = energetic_sum(levels.iter().copied());
            (levels, global)
        } else {
            (Vec::new(), level_of(self.bin_energy.iter().sum()))
        };

        Ok(ProcessingResult {
            fine_spectrum,
            band_levels,
            global_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::bands::{center_frequencies, BandSet};
    use crate::acoustics::calibration::CalibrationReference;
    use approx::assert_abs_diff_eq;

    const RATE: u32 = 44_100;

    fn sine(freq: f64, rms: f64, len: usize) -> Vec<i16> {
        let amplitude = rms * std::f64::consts::SQRT_2;
        (0..len)
            .map(|i| {
                let t = i as f64 / RATE as f64;
                (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()).round() as i16
            })
            .collect()
    }

    fn engine(window_len: usize, set: BandSet) -> SpectralEngine {
        let freqs = center_frequencies(set, RATE as f64 / 2.0);
        let db_fs = CalibrationReference::default().db_fs_reference();
        SpectralEngine::new(RATE, window_len, freqs, db_fs).unwrap()
    }

    #[test]
    fn reference_tone_reads_reference_level() {
        let mut engine = engine(RATE as usize, BandSet::Full);
        let samples = sine(1000.0, 2500.0, RATE as usize);
        for window in [WindowType::Rectangular, WindowType::Hann, WindowType::Tukey] {
            let result = engine.process(&samples, window, false, true).unwrap();
            assert_abs_diff_eq!(result.global_level, 90.0, epsilon = 0.2);
        }
    }

    #[test]
    fn reference_tone_peaks_in_1k_band() {
        let mut engine = engine(RATE as usize / 8, BandSet::Reduced);
        let samples = sine(1000.0, 2500.0, RATE as usize / 8);
        let result = engine.process(&samples, WindowType::Hann, true, true).unwrap();
        let loudest = result
            .band_levels
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| engine.center_frequencies()[i])
            .unwrap();
        assert_eq!(loudest, 1000.0);
        assert_abs_diff_eq!(result.global_level, 90.0, epsilon = 0.5);
    }

    #[test]
    fn time_and_frequency_domain_agree_without_bands() {
        let mut engine = engine(4096, BandSet::Reduced);
        let samples = sine(440.0, 1200.0, 4096);
        let result = engine
            .process(&samples, WindowType::Rectangular, false, false)
            .unwrap();
        assert!(result.band_levels.is_empty());
        let time_domain = crate::acoustics::leq_of_samples(&samples, engine.db_fs_reference());
        assert_abs_diff_eq!(result.global_level, time_domain, epsilon = 0.01);
    }

    #[test]
    fn silence_reads_floor() {
        let mut engine = engine(RATE as usize, BandSet::Full);
        let result = engine
            .process(&vec![0; RATE as usize], WindowType::Hann, true, true)
            .unwrap();
        assert_eq!(result.global_level, LEVEL_FLOOR_DB);
        assert!(result.band_levels.iter().all(|&l| l == LEVEL_FLOOR_DB));
        assert!(result.global_level.is_finite());
    }

    #[test]
    fn short_window_is_rejected() {
        let mut engine = engine(1024, BandSet::Reduced);
        let err = engine
            .process(&[0; 1000], WindowType::Rectangular, false, true)
            .unwrap_err();
        assert!(matches!(
            err,
            SoundLevelError::WindowLength {
                expected: 1024,
                actual: 1000
            }
        ));
    }

    #[test]
    fn fine_spectrum_stops_at_last_band() {
        let freqs = center_frequencies(BandSet::Reduced, 16_000.0);
        let engine = SpectralEngine::new(RATE, 5512, freqs, 100.0).unwrap();
        let expected = (16_000.0 / engine.bin_width()) as usize;
        assert_eq!(engine.fine_spectrum_len(), expected);
    }

    #[test]
    fn a_weighting_lowers_low_frequency_tone() {
        let mut engine = engine(RATE as usize, BandSet::Full);
        let samples = sine(100.0, 2500.0, RATE as usize);
        let flat = engine.process(&samples, WindowType::Hann, false, true).unwrap();
        let weighted = engine.process(&samples, WindowType::Hann, true, true).unwrap();
        assert_abs_diff_eq!(flat.global_level - weighted.global_level, 19.1, epsilon = 0.5);
    }

    #[test]
    fn unknown_centre_frequency_is_a_config_error() {
        let err = SpectralEngine::new(RATE, 1024, vec![1001.0], 100.0).err();
        assert!(matches!(err, Some(SoundLevelError::InvalidConfig(_))));
    }
}
