use std::collections::BTreeMap;

use super::{LeqSummary, LevelRange};

/// Histogram resolution (dB).
pub const BUCKET_WIDTH_DB: f64 = 0.1;

/// Running Leq accumulator.
///
/// The mean is recovered from an energy sum (`10·log10(Σ10^(L/10) / n)`), never
/// from an arithmetic mean of dB values. Percentiles come from a histogram of
/// 0.1 dB buckets ordered by level.
#[derive(Debug, Clone, Default)]
pub struct LeqStats {
    energy_sum: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
    histogram: BTreeMap<i64, u64>,
}

#[inline]
fn bucket_of(level_db: f64) -> i64 {
    (level_db / BUCKET_WIDTH_DB).floor() as i64
}

#[inline]
fn bucket_level(bucket: i64) -> f64 {
    bucket as f64 * BUCKET_WIDTH_DB
}

impl LeqStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one level. Non-finite levels are ignored.
    pub fn add_leq(&mut self, level_db: f64) {
        if !level_db.is_finite() {
            return;
        }
        self.min = Some(self.min.map_or(level_db, |m| m.min(level_db)));
        self.max = Some(self.max.map_or(level_db, |m| m.max(level_db)));
        self.energy_sum += 10f64.powf(level_db / 10.0);
        self.count += 1;
        *self.histogram.entry(bucket_of(level_db)).or_insert(0) += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Energy-domain mean level.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 || self.energy_sum <= 0.0 {
            return None;
        }
        Some(10.0 * (self.energy_sum / self.count as f64).log10())
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Level exceeded `p` percent of the time (LA10 = `percentile(10.0)`).
    ///
    /// Occurrences are accumulated from the loudest bucket down; the result is
    /// the lower boundary of the first bucket at which the accumulated fraction
    /// reaches `p / 100`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let total = self.count;
        if total == 0 {
            return None;
        }
        let target = (p / 100.0).clamp(0.0, 1.0);
        let mut cumulated = 0u64;
        for (&bucket, &n) in self.histogram.iter().rev() {
            cumulated += n;
            if cumulated as f64 / total as f64 >= target {
                return Some(bucket_level(bucket));
            }
        }
        self.histogram.keys().next().copied().map(bucket_level)
    }

    /// Fraction of occurrences whose bucket falls in each range.
    ///
    /// Returns all zeros when nothing was recorded.
    pub fn occurrences_in_ranges(&self, ranges: &[LevelRange]) -> Vec<f64> {
        let mut counts = vec![0u64; ranges.len()];
        for (&bucket, &n) in &self.histogram {
            let level = bucket_level(bucket);
            for (slot, range) in counts.iter_mut().zip(ranges) {
                if range.contains(level) {
                    *slot += n;
                }
            }
        }
        if self.count == 0 {
            return vec![0.0; ranges.len()];
        }
        counts
            .into_iter()
            .map(|c| c as f64 / self.count as f64)
            .collect()
    }

    /// LA10/LA50/LA90 and class occurrences in one snapshot.
    pub fn summary(&self, ranges: &[LevelRange]) -> LeqSummary {
        LeqSummary {
            count: self.count,
            mean: self.mean(),
            min: self.min,
            max: self.max,
            la10: self.percentile(10.0),
            la50: self.percentile(50.0),
            la90: self.percentile(90.0),
            class_occurrences: self.occurrences_in_ranges(ranges),
        }
    }
}
