//! # soundlevel-core
//!
//! Sound level meter engine: calibrated third-octave spectra, equivalent
//! continuous levels and their statistics.
//!
//! ## Architecture
//!
//! ```text
//! Microphone / WAV → SampleSource → capture thread ──┬─► live queue    → WindowController(125 ms) → LiveSpectrum
//!                                                    └─► delayed queue → WindowController(1 s)    → DelayedMeasure
//!                                                                                 │
//!                                                                         EventBus (crossbeam)
//! ```
//!
//! The audio callback only downmixes into a lock-free ring. FFTs run on the
//! consumer threads, one per analysis path, so a slow delayed analysis never
//! holds back the live spectrum.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod acoustics;
pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod spectral;
pub mod stats;

// Convenience re-exports for downstream crates
pub use acoustics::bands::BandSet;
pub use acoustics::calibration::CalibrationReference;
pub use audio::{BufferSource, CaptureFormat, SampleSource, SourceFactory, WavSource};
pub use engine::{
    ConsumerConfig, DiagnosticsSnapshot, EngineConfig, ProcessingDelay, SessionInfo,
    SoundLevelEngine,
};
pub use error::{Result, SoundLevelError};
pub use ipc::events::{
    DelayedMeasureEvent, LifecycleEvent, LifecycleState, LiveSpectrumEvent, MeasurementEvent,
};
pub use spectral::{ProcessingResult, SpectralEngine, WindowController, WindowType};
pub use stats::{LeqStats, LeqSummary, LevelRange};

#[cfg(feature = "audio-cpal")]
pub use audio::DeviceCapture;
