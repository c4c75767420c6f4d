//! dB-FS calibration anchored on a reference tone.
//!
//! A tone with RMS `reference_rms` (16-bit scale) must read `reference_level_db`.
//! The default pair (2500 RMS ⇒ 90 dB SPL) follows the Android audio
//! recording specification for unprocessed voice-recognition input.

use serde::{Deserialize, Serialize};

use super::FULL_SCALE;
use crate::error::{Result, SoundLevelError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CalibrationReference {
    /// RMS amplitude of the reference tone on the 16-bit scale.
    pub reference_rms: f64,
    /// Level the reference tone must read (dB).
    pub reference_level_db: f64,
    /// Device-specific correction added on top of the reference (dB).
    pub gain_db: f64,
}

impl Default for CalibrationReference {
    fn default() -> Self {
        Self {
            reference_rms: 2500.0,
            reference_level_db: 90.0,
            gain_db: 0.0,
        }
    }
}

impl CalibrationReference {
    /// Level of a full-scale RMS signal, i.e. the offset added to `20·log10(rms)`.
    pub fn db_fs_reference(&self) -> f64 {
        self.reference_level_db - 20.0 * (self.reference_rms / FULL_SCALE).log10() + self.gain_db
    }

    /// Copy with a different gain correction.
    pub fn with_gain_db(self, gain_db: f64) -> Self {
        Self { gain_db, ..self }
    }

    /// Gain correction that makes a measured level read as `expected_level_db`.
    pub fn calibrated(self, measured_level_db: f64, expected_level_db: f64) -> Self {
        self.with_gain_db(self.gain_db + expected_level_db - measured_level_db)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.reference_rms > 0.0 && self.reference_rms <= FULL_SCALE) {
            return Err(SoundLevelError::InvalidConfig(format!(
                "reference RMS {} outside (0, {FULL_SCALE}]",
                self.reference_rms
            )));
        }
        if !self.reference_level_db.is_finite() || !self.gain_db.is_finite() {
            return Err(SoundLevelError::InvalidConfig(
                "calibration levels must be finite".into(),
            ));
        }
        Ok(())
    }
}
