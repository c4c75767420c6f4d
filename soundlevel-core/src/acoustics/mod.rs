//! Acoustic constants and level arithmetic.
//!
//! Every level in this crate is a dB value. Averaging and summing always
//! happen in the energy domain (`10^(L/10)`) and are converted back with
//! `10·log10`; dB values are never averaged directly.
//!
//! Zero energy maps to [`LEVEL_FLOOR_DB`] instead of `-inf`, and the floor maps
//! back to zero energy, so silent bands never pollute an energetic sum.

pub mod bands;
pub mod calibration;

/// Full-scale amplitude of a signed 16-bit sample.
pub const FULL_SCALE: f64 = 32768.0;

/// Lowest level the engine reports. Silence and non-finite results clamp here.
pub const LEVEL_FLOOR_DB: f64 = -100.0;

/// Fast time weighting period (s).
pub const FAST_PERIOD_SECS: f64 = 0.125;

/// Slow time weighting period (s).
pub const SLOW_PERIOD_SECS: f64 = 1.0;

/// Convert a signed 16-bit sample to the unit range.
#[inline]
pub fn i16_to_unit(sample: i16) -> f32 {
    sample as f32 / FULL_SCALE as f32
}

/// Energy (`10^(L/10)`) of a level; the floor and anything below it is silence.
#[inline]
pub fn db_to_energy(level_db: f64) -> f64 {
    if !level_db.is_finite() || level_db <= LEVEL_FLOOR_DB {
        0.0
    } else {
        10f64.powf(level_db / 10.0)
    }
}

/// Level of an energy value, clamped to [`LEVEL_FLOOR_DB`].
#[inline]
pub fn energy_to_db(energy: f64) -> f64 {
    if !energy.is_finite() || energy <= 0.0 {
        return LEVEL_FLOOR_DB;
    }
    (10.0 * energy.log10()).max(LEVEL_FLOOR_DB)
}

/// Logarithmic sum of levels (total energy, back in dB).
pub fn energetic_sum<I>(levels: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    energy_to_db(levels.into_iter().map(db_to_energy).sum())
}

/// Logarithmic mean of levels. Empty input yields the floor.
pub fn energetic_mean(levels: &[f64]) -> f64 {
    if levels.is_empty() {
        return LEVEL_FLOOR_DB;
    }
    let sum: f64 = levels.iter().copied().map(db_to_energy).sum();
    energy_to_db(sum / levels.len() as f64)
}

/// Convert a unit-scale RMS amplitude to a calibrated level.
#[inline]
pub fn rms_to_db(rms: f64, db_fs_reference: f64) -> f64 {
    if !rms.is_finite() || rms <= 0.0 {
        return LEVEL_FLOOR_DB;
    }
    (20.0 * rms.log10() + db_fs_reference).max(LEVEL_FLOOR_DB)
}

/// Unit-scale RMS of 16-bit samples.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / FULL_SCALE;
            v * v
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Time-domain equivalent level of a block of samples (no band split, no weighting).
pub fn leq_of_samples(samples: &[i16], db_fs_reference: f64) -> f64 {
    rms_to_db(rms(samples), db_fs_reference)
}
