//! Session statistics over sound levels.
//!
//! [`LeqStats`] keeps everything needed to answer mean/min/max, percentile and
//! class-occurrence queries without retaining the raw level series.

mod leq;

pub use leq::{LeqStats, BUCKET_WIDTH_DB};

use serde::{Deserialize, Serialize};

/// Half-open level range `[min, max)` in dB. Either bound may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelRange {
    pub min: f64,
    pub max: f64,
}

impl LevelRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, level_db: f64) -> bool {
        level_db >= self.min && level_db < self.max
    }
}

/// Noise-exposure classes: below 45, 45-55, 55-65, 65-75, 75 and above.
pub fn default_class_ranges() -> Vec<LevelRange> {
    vec![
        LevelRange::new(f64::NEG_INFINITY, 45.0),
        LevelRange::new(45.0, 55.0),
        LevelRange::new(55.0, 65.0),
        LevelRange::new(65.0, 75.0),
        LevelRange::new(75.0, f64::INFINITY),
    ]
}

/// Snapshot of a [`LeqStats`] accumulator. `None` means no level was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeqSummary {
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub la10: Option<f64>,
    pub la50: Option<f64>,
    pub la90: Option<f64>,
    /// Fraction of occurrences per requested range, in request order.
    pub class_occurrences: Vec<f64>,
}
