use serde::{Deserialize, Serialize};

use crate::acoustics::bands::{center_frequencies, BandSet};
use crate::acoustics::calibration::CalibrationReference;
use crate::acoustics::{FAST_PERIOD_SECS, SLOW_PERIOD_SECS};
use crate::audio::{default_format_preferences, CaptureFormat};
use crate::error::{Result, SoundLevelError};
use crate::spectral::WindowType;

/// Highest live band; typical phone and laptop microphones roll off above it.
pub const DEFAULT_LIVE_MAX_FREQUENCY: f64 = 16_000.0;

/// Analysis parameters of one consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    /// Analysis window duration (s).
    pub window_secs: f64,
    /// Fraction of each window shared with the next one, in `[0, 1)`.
    pub overlap: f64,
    pub window_type: WindowType,
    pub a_weighting: bool,
    pub bands: BandSet,
    /// Highest centre frequency analysed (Hz); Nyquist caps it further.
    pub max_frequency: f64,
}

impl ConsumerConfig {
    /// Fast path: 125 ms rectangular windows, unweighted, 100 Hz-16 kHz.
    pub fn live() -> Self {
        Self {
            window_secs: FAST_PERIOD_SECS,
            overlap: 0.0,
            window_type: WindowType::Rectangular,
            a_weighting: false,
            bands: BandSet::Reduced,
            max_frequency: DEFAULT_LIVE_MAX_FREQUENCY,
        }
    }

    /// Standard path: 1 s Hann windows with 50 % overlap, A-weighted, full range.
    pub fn delayed() -> Self {
        Self {
            window_secs: SLOW_PERIOD_SECS,
            overlap: 0.5,
            window_type: WindowType::Hann,
            a_weighting: true,
            bands: BandSet::Full,
            max_frequency: 20_000.0,
        }
    }

    /// Samples per window, truncated.
    pub fn window_len(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.window_secs).floor() as usize
    }

    pub fn center_frequencies(&self, sample_rate: u32) -> Vec<f64> {
        center_frequencies(self.bands, self.max_frequency.min(sample_rate as f64 / 2.0))
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(SoundLevelError::InvalidConfig(format!(
                "{name} window duration must be > 0, got {}",
                self.window_secs
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(SoundLevelError::InvalidConfig(format!(
                "{name} overlap {} outside [0, 1)",
                self.overlap
            )));
        }
        if !(self.max_frequency.is_finite() && self.max_frequency > 0.0) {
            return Err(SoundLevelError::InvalidConfig(format!(
                "{name} max frequency must be > 0"
            )));
        }
        Ok(())
    }
}

/// Configuration for [`crate::SoundLevelEngine`].
///
/// Immutable once the engine is built; every session gets its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EngineConfig {
    pub calibration: CalibrationReference,
    pub live: ConsumerConfig,
    pub delayed: ConsumerConfig,
    /// Capture formats in descending preference.
    pub format_preferences: Vec<CaptureFormat>,
    /// Capture chunk duration (s).
    pub chunk_secs: f64,
    /// Consumer sleep when its queue is empty.
    pub empty_queue_sleep_ms: u64,
    /// Interval of the drain-complete check.
    pub drain_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationReference::default(),
            live: ConsumerConfig::live(),
            delayed: ConsumerConfig::delayed(),
            format_preferences: default_format_preferences(),
            chunk_secs: FAST_PERIOD_SECS,
            empty_queue_sleep_ms: 5,
            drain_poll_ms: 10,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        self.live.validate("live")?;
        self.delayed.validate("delayed")?;
        if self.format_preferences.is_empty() {
            return Err(SoundLevelError::InvalidConfig(
                "capture format preference list is empty".into(),
            ));
        }
        if let Some(bad) = self
            .format_preferences
            .iter()
            .find(|f| f.sample_rate == 0 || f.channels == 0)
        {
            return Err(SoundLevelError::InvalidConfig(format!(
                "invalid capture format {bad:?}"
            )));
        }
        if !(self.chunk_secs.is_finite() && self.chunk_secs > 0.0) {
            return Err(SoundLevelError::InvalidConfig(
                "chunk duration must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Checks that depend on the negotiated sample rate.
    pub fn validate_for_rate(&self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(SoundLevelError::InvalidConfig("sample rate must be > 0".into()));
        }
        for (name, consumer) in [("live", &self.live), ("delayed", &self.delayed)] {
            let len = consumer.window_len(sample_rate);
            if len < 2 {
                return Err(SoundLevelError::InvalidConfig(format!(
                    "{name} window of {}s holds {len} samples at {sample_rate} Hz",
                    consumer.window_secs
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        config.validate_for_rate(44_100).unwrap();
        assert_eq!(config.live.window_len(44_100), 5512);
        assert_eq!(config.live.window_len(48_000), 6000);
        assert_eq!(config.delayed.window_len(44_100), 44_100);
    }

    #[test]
    fn live_bands_are_capped() {
        let live = ConsumerConfig::live();
        let freqs = live.center_frequencies(44_100);
        assert_eq!(freqs.last().copied(), Some(16_000.0));
        // Nyquist wins over the configured cap
        assert_eq!(live.center_frequencies(8_000).last().copied(), Some(4_000.0));
    }

    #[test]
    fn rejects_bad_overlap_and_empty_preferences() {
        let mut config = EngineConfig::default();
        config.delayed.overlap = 1.0;
        assert!(matches!(
            config.validate(),
            Err(SoundLevelError::InvalidConfig(_))
        ));

        let config = EngineConfig {
            format_preferences: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_window_too_short_for_rate() {
        let mut config = EngineConfig::default();
        config.live.window_secs = 0.0001;
        config.validate().unwrap();
        assert!(config.validate_for_rate(8_000).is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"chunkSecs":0.05,"calibration":{"gainDb":2.5}}"#).unwrap();
        assert_eq!(config.chunk_secs, 0.05);
        assert_eq!(config.calibration.gain_db, 2.5);
        assert_eq!(config.calibration.reference_rms, 2500.0);
        assert_eq!(config.delayed, ConsumerConfig::delayed());
    }
}
