//! Events published by the measurement engine.
//!
//! | Event | Cadence |
//! |-------|---------|
//! | [`LiveSpectrumEvent`] | every live window (~125 ms) |
//! | [`DelayedMeasureEvent`] | every delayed window (~1 s) |
//! | [`LifecycleEvent`] | on every state transition |

use serde::{Deserialize, Serialize};

/// Fast-path result for responsive display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSpectrumEvent {
    /// Monotonically increasing per-stream sequence number.
    pub seq: u64,
    /// Per-bin levels (dB) up to the highest live band.
    pub fine_spectrum: Vec<f32>,
    /// One level per live centre frequency (dB).
    pub band_levels: Vec<f64>,
    pub global_level: f64,
}

/// Slow-path, storage-grade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedMeasureEvent {
    pub seq: u64,
    /// One level per delayed centre frequency (dB, A-weighted by default).
    pub band_levels: Vec<f64>,
    pub global_level: f64,
    /// Wall-clock time (Unix ms) at which the underlying window began,
    /// derived from the session start plus elapsed samples.
    pub window_start_time_millis: i64,
}

/// Engine lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created, `start()` not yet called.
    Idle,
    /// Capture running, both consumers analysing.
    Capturing,
    /// Capture stopped; consumers draining queued chunks.
    DrainPending,
    /// Session over. A new engine is required for another session.
    Closed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub state: LifecycleState,
    pub previous: Option<LifecycleState>,
    /// Failure or cancellation detail, if any.
    pub detail: Option<String>,
}

/// Everything the engine publishes, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MeasurementEvent {
    LiveSpectrum(LiveSpectrumEvent),
    DelayedMeasure(DelayedMeasureEvent),
    LifecycleTransition(LifecycleEvent),
}

impl MeasurementEvent {
    pub fn as_lifecycle(&self) -> Option<&LifecycleEvent> {
        match self {
            MeasurementEvent::LifecycleTransition(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_event_serializes_with_camel_case_and_kind_tag() {
        let event = MeasurementEvent::DelayedMeasure(DelayedMeasureEvent {
            seq: 4,
            band_levels: vec![41.5, 52.25],
            global_level: 53.0,
            window_start_time_millis: 1_700_000_000_123,
        });

        let json = serde_json::to_value(&event).expect("serialize delayed event");
        assert_eq!(json["kind"], "delayedMeasure");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["windowStartTimeMillis"], 1_700_000_000_123_i64);
        assert_eq!(json["bandLevels"][1], 52.25);

        let round_trip: MeasurementEvent =
            serde_json::from_value(json).expect("deserialize delayed event");
        assert_eq!(round_trip, event);
    }

    #[test]
    fn live_event_carries_fine_spectrum() {
        let event = MeasurementEvent::LiveSpectrum(LiveSpectrumEvent {
            seq: 1,
            fine_spectrum: vec![10.0, 20.5],
            band_levels: vec![30.0],
            global_level: 30.0,
        });
        let json = serde_json::to_value(&event).expect("serialize live event");
        assert_eq!(json["kind"], "liveSpectrum");
        assert_eq!(json["fineSpectrum"][1], 20.5);
        assert_eq!(json["globalLevel"], 30.0);
    }

    #[test]
    fn lifecycle_event_serializes_with_lowercase_state() {
        let event = LifecycleEvent {
            state: LifecycleState::DrainPending,
            previous: Some(LifecycleState::Capturing),
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize lifecycle event");
        assert_eq!(json["state"], "drainpending");
        assert_eq!(json["previous"], "capturing");
        assert!(json["detail"].is_null());

        let round_trip: LifecycleEvent =
            serde_json::from_value(json).expect("deserialize lifecycle event");
        assert_eq!(round_trip.state, LifecycleState::DrainPending);
    }

    #[test]
    fn lifecycle_state_rejects_other_casing() {
        assert!(serde_json::from_str::<LifecycleState>(r#""Closed""#).is_err());
        assert!(LifecycleState::Closed.is_terminal());
        assert!(!LifecycleState::DrainPending.is_terminal());
    }
}
