//! Accumulates samples into analysis windows and decides when to evaluate.
//!
//! Evaluations start once a full window is buffered and then repeat every
//! `step = floor(window_len · (1 − overlap))` samples. With overlap the
//! controller keeps the last `round(1 / (1 − overlap))` results and publishes
//! their energy-domain average once that many have been collected, so the
//! published cadence stays one record per window duration.
//!
//! Samples that never complete a window are dropped by [`WindowController::flush`].

use std::collections::VecDeque;

use super::{energetic_average, ProcessingResult, SpectralEngine, WindowType};
use crate::error::{Result, SoundLevelError};

/// A published (possibly averaged) result.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedResult {
    pub result: ProcessingResult,
    /// Stream position (in samples) of the first sample of the oldest window
    /// contributing to `result`.
    pub window_start_sample: u64,
}

pub struct WindowController {
    engine: SpectralEngine,
    window_type: WindowType,
    apply_weighting: bool,
    compute_band_levels: bool,
    overlap: f64,
    step: usize,
    retain: usize,
    ring: Vec<i16>,
    write_pos: usize,
    window: Vec<i16>,
    accumulated: u64,
    last_processed: u64,
    cached: VecDeque<ProcessingResult>,
    cached_start: u64,
    evaluations: u64,
}

impl WindowController {
    pub fn new(
        engine: SpectralEngine,
        overlap: f64,
        window_type: WindowType,
        apply_weighting: bool,
        compute_band_levels: bool,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&overlap) {
            return Err(SoundLevelError::InvalidConfig(format!(
                "overlap {overlap} outside [0, 1)"
            )));
        }
        let window_len = engine.window_len();
        let step = ((window_len as f64 * (1.0 - overlap)).floor() as usize).clamp(1, window_len);
        let retain = ((1.0 / (1.0 - overlap)).round() as usize).max(1);
        Ok(Self {
            engine,
            window_type,
            apply_weighting,
            compute_band_levels,
            overlap,
            step,
            retain,
            ring: vec![0; window_len],
            write_pos: 0,
            window: vec![0; window_len],
            accumulated: 0,
            last_processed: (window_len - step) as u64,
            cached: VecDeque::with_capacity(retain),
            cached_start: 0,
            evaluations: 0,
        })
    }

    pub fn engine(&self) -> &SpectralEngine {
        &self.engine
    }

    pub fn window_len(&self) -> usize {
        self.ring.len()
    }

    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    /// Samples between two evaluations.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Evaluations run so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Samples pushed so far.
    pub fn samples_pushed(&self) -> u64 {
        self.accumulated
    }

    /// Append samples, returning every result published while consuming them.
    pub fn push(&mut self, mut samples: &[i16]) -> Result<Vec<WindowedResult>> {
        let mut published = Vec::new();
        while !samples.is_empty() {
            let next_trigger = self.last_processed + self.step as u64;
            let until_trigger = (next_trigger - self.accumulated) as usize;
            let take = until_trigger.min(samples.len());
            self.write(&samples[..take]);
            samples = &samples[take..];
            if self.accumulated == next_trigger {
                if let Some(result) = self.evaluate()? {
                    published.push(result);
                }
            }
        }
        Ok(published)
    }

    /// Publish whatever results are still cached. Partial windows are dropped.
    pub fn flush(&mut self) -> Option<WindowedResult> {
        self.publish_cached()
    }

    fn write(&mut self, samples: &[i16]) {
        let len = self.ring.len();
        let mut rest = samples;
        while !rest.is_empty() {
            let n = (len - self.write_pos).min(rest.len());
            self.ring[self.write_pos..self.write_pos + n].copy_from_slice(&rest[..n]);
            self.write_pos = (self.write_pos + n) % len;
            rest = &rest[n..];
        }
        self.accumulated += samples.len() as u64;
    }

    fn evaluate(&mut self) -> Result<Option<WindowedResult>> {
        let len = self.ring.len();
        let tail = len - self.write_pos;
        self.window[..tail].copy_from_slice(&self.ring[self.write_pos..]);
        self.window[tail..].copy_from_slice(&self.ring[..self.write_pos]);

        let result = self.engine.process(
            &self.window,
            self.window_type,
            self.apply_weighting,
            self.compute_band_levels,
        )?;
        self.last_processed += self.step as u64;
        self.evaluations += 1;

        if self.cached.is_empty() {
            self.cached_start = self.accumulated - len as u64;
        }
        self.cached.push_back(result);
        if self.cached.len() >= self.retain {
            return Ok(self.publish_cached());
        }
        Ok(None)
    }

    fn publish_cached(&mut self) -> Option<WindowedResult> {
        let results: Vec<ProcessingResult> = self.cached.drain(..).collect();
        energetic_average(&results).map(|result| WindowedResult {
            result,
            window_start_sample: self.cached_start,
        })
    }
}
