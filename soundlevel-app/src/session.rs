//! Aggregates delayed measures of one session into the exported summary.

use serde::{Deserialize, Serialize};
use soundlevel_core::acoustics::{db_to_energy, energy_to_db};
use soundlevel_core::stats::default_class_ranges;
use soundlevel_core::{DelayedMeasureEvent, LeqStats, LeqSummary, LevelRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandLeq {
    pub center_frequency: f64,
    pub leq: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub records: u64,
    pub first_record_millis: Option<i64>,
    pub last_record_millis: Option<i64>,
    pub class_ranges: Vec<LevelRange>,
    pub global: LeqSummary,
    pub bands: Vec<BandLeq>,
    pub live_spectra: u64,
}

pub struct MeasurementSession {
    center_frequencies: Vec<f64>,
    class_ranges: Vec<LevelRange>,
    global: LeqStats,
    band_energy: Vec<f64>,
    first_millis: Option<i64>,
    last_millis: Option<i64>,
    live_spectra: u64,
}

impl MeasurementSession {
    pub fn new(center_frequencies: Vec<f64>) -> Self {
        Self {
            band_energy: vec![0.0; center_frequencies.len()],
            center_frequencies,
            class_ranges: default_class_ranges(),
            global: LeqStats::new(),
            first_millis: None,
            last_millis: None,
            live_spectra: 0,
        }
    }

    pub fn add_delayed(&mut self, event: &DelayedMeasureEvent) {
        self.global.add_leq(event.global_level);
        for (acc, &level) in self.band_energy.iter_mut().zip(&event.band_levels) {
            *acc += db_to_energy(level);
        }
        self.first_millis.get_or_insert(event.window_start_time_millis);
        self.last_millis = Some(event.window_start_time_millis);
    }

    pub fn note_live(&mut self) {
        self.live_spectra += 1;
    }

    pub fn records(&self) -> u64 {
        self.global.count()
    }

    pub fn summary(&self) -> SessionSummary {
        let records = self.global.count();
        let bands = self
            .center_frequencies
            .iter()
            .zip(&self.band_energy)
            .map(|(&center_frequency, &energy)| BandLeq {
                center_frequency,
                leq: if records == 0 {
                    energy_to_db(0.0)
                } else {
                    energy_to_db(energy / records as f64)
                },
            })
            .collect();
        SessionSummary {
            records,
            first_record_millis: self.first_millis,
            last_record_millis: self.last_millis,
            class_ranges: self.class_ranges.clone(),
            global: self.global.summary(&self.class_ranges),
            bands,
            live_spectra: self.live_spectra,
        }
    }
}
