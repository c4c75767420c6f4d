//! `SoundLevelEngine`: one measurement session from start to `Closed`.
//!
//! ## Lifecycle
//!
//! ```text
//! SoundLevelEngine::new(config)   config validated, state = Idle
//!     └─► start(factory)          source opened on the capture thread,
//!                                 consumers spawned, state = Capturing
//!         ├─► stop()              recording = false → DrainPending → Closed
//!         └─► cancel()            canceled = true   → Closed (queues discarded)
//! ```
//!
//! `Closed` is terminal: a new session needs a new engine, so no window or
//! statistics state survives from one session to the next.
//!
//! ## Threading
//!
//! Three threads per session: the capture thread (producer) and one consumer
//! per analysis path. The source is built by its factory *on* the capture
//! thread because `cpal::Stream` is `!Send`; a sync oneshot reports the open
//! result to `start()`, which spawns the consumers only after it succeeded.

pub mod capture;
pub mod config;
pub mod lifecycle;
pub mod pipeline;

pub use config::{ConsumerConfig, EngineConfig};
pub use pipeline::{AnalysisPath, DiagnosticsSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::{CaptureFormat, SampleSource, SourceFactory};
use crate::buffering::ChunkQueue;
use crate::error::{Result, SoundLevelError};
use crate::ipc::bus::EventBus;
use crate::ipc::events::{LifecycleState, MeasurementEvent};
use crate::spectral::{SpectralEngine, WindowController};

use capture::{CaptureContext, ConsumerHandle};
use lifecycle::Lifecycle;
use pipeline::{ConsumerContext, PipelineDiagnostics, SessionFlags};

/// What a started session analyses, fixed at `start()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub format: CaptureFormat,
    pub sample_rate: u32,
    /// Unix ms of the first captured sample.
    pub started_at_millis: i64,
    pub live_center_frequencies: Vec<f64>,
    pub delayed_center_frequencies: Vec<f64>,
    pub live_window_len: usize,
    pub delayed_window_len: usize,
    /// FFT bin width of the live fine spectrum (Hz).
    pub live_bin_width: f64,
}

/// How far each analysis lags behind capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingDelay {
    pub live_secs: f64,
    pub delayed_secs: f64,
}

struct Opened {
    format: CaptureFormat,
    started_at_millis: i64,
}

/// The top-level engine handle.
///
/// `Send + Sync`: share it behind an `Arc` between the controlling thread and
/// event readers.
pub struct SoundLevelEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    lifecycle: Arc<Lifecycle>,
    flags: Arc<SessionFlags>,
    live_queue: ChunkQueue,
    delayed_queue: ChunkQueue,
    diagnostics: Arc<PipelineDiagnostics>,
    started: AtomicBool,
    session: Mutex<Option<SessionInfo>>,
    capture_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SoundLevelEngine {
    /// Validate `config` and create an idle engine.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let bus = Arc::new(EventBus::new());
        Ok(Self {
            config,
            lifecycle: Arc::new(Lifecycle::new(Arc::clone(&bus))),
            bus,
            flags: Arc::new(SessionFlags::default()),
            live_queue: ChunkQueue::new(),
            delayed_queue: ChunkQueue::new(),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            started: AtomicBool::new(false),
            session: Mutex::new(None),
            capture_thread: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<MeasurementEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Start a session on an already-built source.
    pub fn start_source<S>(&self, source: S) -> Result<SessionInfo>
    where
        S: SampleSource + Send + 'static,
    {
        self.start(Box::new(move || Ok(Box::new(source) as Box<dyn SampleSource>)))
    }

    /// Open the source on a new capture thread and start both consumers.
    ///
    /// Blocks until the source is open (or failed). On failure no consumer is
    /// started and the engine closes.
    ///
    /// # Errors
    /// - [`SoundLevelError::AlreadyStarted`] / [`SoundLevelError::SessionClosed`]
    ///   when called twice.
    /// - The factory's error, e.g. [`SoundLevelError::NoCompatibleFormat`].
    /// - [`SoundLevelError::InvalidConfig`] when the windows do not fit the
    ///   negotiated sample rate.
    pub fn start(&self, factory: SourceFactory) -> Result<SessionInfo> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(match self.state() {
                LifecycleState::Closed => SoundLevelError::SessionClosed,
                _ => SoundLevelError::AlreadyStarted,
            });
        }
        self.diagnostics.reset();

        let (open_tx, open_rx) = mpsc::channel::<Result<Opened>>();
        let (go_tx, go_rx) = mpsc::channel::<Option<Vec<ConsumerHandle>>>();

        let flags = Arc::clone(&self.flags);
        let lifecycle = Arc::clone(&self.lifecycle);
        let diagnostics = Arc::clone(&self.diagnostics);
        let drain_poll = Duration::from_millis(self.config.drain_poll_ms);

        let spawned = std::thread::Builder::new()
            .name("soundlevel-capture".into())
            .spawn(move || {
                // must happen on this thread: device streams are !Send
                let mut source = match factory() {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let opened = Opened {
                    format: source.format(),
                    started_at_millis: chrono::Utc::now().timestamp_millis(),
                };
                if open_tx.send(Ok(opened)).is_err() {
                    source.close();
                    return;
                }
                let consumers = match go_rx.recv() {
                    Ok(Some(consumers)) => consumers,
                    _ => {
                        source.close();
                        return;
                    }
                };
                capture::run(CaptureContext {
                    source,
                    consumers,
                    flags,
                    lifecycle,
                    diagnostics,
                    drain_poll,
                });
            });
        let capture_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_start(SoundLevelError::Io(e))),
        };

        let opened = match open_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = capture_thread.join();
                return Err(self.fail_start(e));
            }
            Err(_) => {
                let _ = capture_thread.join();
                return Err(self.fail_start(SoundLevelError::Other(anyhow::anyhow!(
                    "capture thread died before opening its source"
                ))));
            }
        };

        let (session, consumers) = match self.spawn_consumers(&opened) {
            Ok(spawned) => spawned,
            Err(e) => {
                let _ = go_tx.send(None);
                let _ = capture_thread.join();
                return Err(self.fail_start(e));
            }
        };

        *self.session.lock() = Some(session.clone());
        self.lifecycle.transition(LifecycleState::Capturing, None);
        info!(
            sample_rate = session.sample_rate,
            channels = session.format.channels,
            live_bands = session.live_center_frequencies.len(),
            delayed_bands = session.delayed_center_frequencies.len(),
            "measurement started"
        );
        if let Err(mpsc::SendError(Some(orphans))) = go_tx.send(Some(consumers)) {
            warn!("capture thread exited before consumers were attached");
            self.flags.canceled.store(true, Ordering::Release);
            for orphan in orphans {
                let _ = orphan.thread.join();
            }
            self.lifecycle
                .transition(LifecycleState::Closed, Some("capture thread lost".into()));
        }
        *self.capture_thread.lock() = Some(capture_thread);
        Ok(session)
    }

    fn spawn_consumers(&self, opened: &Opened) -> Result<(SessionInfo, Vec<ConsumerHandle>)> {
        let rate = opened.format.sample_rate;
        self.config.validate_for_rate(rate)?;
        let db_fs = self.config.calibration.db_fs_reference();

        let build = |cfg: &ConsumerConfig| -> Result<WindowController> {
            let engine =
                SpectralEngine::new(rate, cfg.window_len(rate), cfg.center_frequencies(rate), db_fs)?;
            WindowController::new(engine, cfg.overlap, cfg.window_type, cfg.a_weighting, true)
        };
        let live = build(&self.config.live)?;
        let delayed = build(&self.config.delayed)?;

        let session = SessionInfo {
            format: opened.format,
            sample_rate: rate,
            started_at_millis: opened.started_at_millis,
            live_center_frequencies: live.engine().center_frequencies().to_vec(),
            delayed_center_frequencies: delayed.engine().center_frequencies().to_vec(),
            live_window_len: live.window_len(),
            delayed_window_len: delayed.window_len(),
            live_bin_width: live.engine().bin_width(),
        };

        let mut handles: Vec<ConsumerHandle> = Vec::with_capacity(2);
        for (path, controller, queue) in [
            (AnalysisPath::Live, live, self.live_queue.clone()),
            (AnalysisPath::Delayed, delayed, self.delayed_queue.clone()),
        ] {
            let processing = Arc::new(AtomicBool::new(false));
            let ctx = ConsumerContext {
                path,
                controller,
                queue: queue.clone(),
                flags: Arc::clone(&self.flags),
                processing: Arc::clone(&processing),
                bus: Arc::clone(&self.bus),
                diagnostics: Arc::clone(&self.diagnostics),
                sample_rate: rate,
                session_start_millis: opened.started_at_millis,
                empty_queue_sleep: Duration::from_millis(self.config.empty_queue_sleep_ms),
            };
            let spawned = std::thread::Builder::new()
                .name(format!("soundlevel-{}", path.as_str()))
                .spawn(move || pipeline::run(ctx));
            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    // stop whichever consumer already runs
                    self.flags.canceled.store(true, Ordering::Release);
                    for handle in handles {
                        let _ = handle.thread.join();
                    }
                    return Err(SoundLevelError::Io(e));
                }
            };
            handles.push(ConsumerHandle {
                name: path.as_str(),
                queue,
                processing,
                thread,
            });
        }
        Ok((session, handles))
    }

    fn fail_start(&self, error: SoundLevelError) -> SoundLevelError {
        warn!("measurement failed to start: {error}");
        self.flags.recording.store(false, Ordering::Release);
        self.lifecycle
            .transition(LifecycleState::Closed, Some(error.to_string()));
        error
    }

    /// Stop capturing and let both consumers drain what is queued.
    pub fn stop(&self) {
        self.flags.recording.store(false, Ordering::Release);
        if !self.started.load(Ordering::SeqCst) {
            self.close_unstarted(None);
        }
        info!("stop requested");
    }

    /// Abandon the session: queued chunks are discarded and nothing more is
    /// published except the final `Closed` transition.
    pub fn cancel(&self) {
        self.flags.canceled.store(true, Ordering::Release);
        self.flags.recording.store(false, Ordering::Release);
        if !self.started.load(Ordering::SeqCst) {
            self.close_unstarted(Some("canceled".into()));
        }
        info!("cancel requested");
    }

    fn close_unstarted(&self, detail: Option<String>) {
        // claim start so a racing start() cannot revive the engine
        if !self.started.swap(true, Ordering::SeqCst) {
            self.lifecycle.transition(LifecycleState::Closed, detail);
        }
    }

    /// Block until the session is closed, or `timeout` elapses.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_closed(timeout)
    }

    /// Wait for the capture thread (and with it both consumers) to finish.
    pub fn join(&self) {
        let handle = self.capture_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("capture thread panicked");
            }
        }
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.lock().clone()
    }

    /// Analysis backlog of each consumer, in seconds of audio.
    pub fn processing_delay(&self) -> ProcessingDelay {
        let rate = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.sample_rate)
            .unwrap_or(0);
        let secs = |queue: &ChunkQueue| {
            if rate == 0 {
                0.0
            } else {
                queue.queued_samples() as f64 / rate as f64
            }
        };
        ProcessingDelay {
            live_secs: secs(&self.live_queue),
            delayed_secs: secs(&self.delayed_queue),
        }
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

impl Drop for SoundLevelEngine {
    fn drop(&mut self) {
        if self.capture_thread.get_mut().is_some() {
            if !self.state().is_terminal() {
                self.cancel();
            }
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{negotiate, BufferSource};

    fn recv_lifecycle(rx: &Receiver<MeasurementEvent>, timeout: Duration) -> Vec<LifecycleState> {
        let deadline = std::time::Instant::now() + timeout;
        let mut states = Vec::new();
        while let Some(left) = deadline.checked_duration_since(std::time::Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) => {
                    if let Some(l) = event.as_lifecycle() {
                        states.push(l.state);
                        if l.state == LifecycleState::Closed {
                            break;
                        }
                    }
                }
                Err(_) => break,
            }
        }
        states
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let mut config = EngineConfig::default();
        config.live.overlap = -0.1;
        assert!(matches!(
            SoundLevelEngine::new(config),
            Err(SoundLevelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn incompatible_format_fails_fast_without_consumers() {
        let engine = SoundLevelEngine::new(EngineConfig::default()).unwrap();
        let rx = engine.subscribe();
        let prefs = engine.config().format_preferences.clone();
        let err = engine
            .start(Box::new(move || {
                let format = negotiate(&prefs, |_| false)?;
                Ok(Box::new(BufferSource::new(Vec::new(), format.sample_rate, 1))
                    as Box<dyn SampleSource>)
            }))
            .unwrap_err();
        assert!(matches!(err, SoundLevelError::NoCompatibleFormat));
        assert_eq!(engine.state(), LifecycleState::Closed);
        assert_eq!(engine.diagnostics().live_evaluations, 0);
        assert!(engine.session_info().is_none());
        let states = recv_lifecycle(&rx, Duration::from_millis(100));
        assert_eq!(states, vec![LifecycleState::Closed]);
    }

    #[test]
    fn closed_engine_cannot_restart() {
        let engine = SoundLevelEngine::new(EngineConfig::default()).unwrap();
        engine
            .start_source(BufferSource::new(vec![0; 4410], 44_100, 441))
            .unwrap();
        assert!(engine.wait_closed(Duration::from_secs(5)));
        let err = engine
            .start_source(BufferSource::new(vec![0; 10], 44_100, 10))
            .unwrap_err();
        assert!(matches!(err, SoundLevelError::SessionClosed));
    }

    struct LostAfter {
        remaining: usize,
    }

    impl SampleSource for LostAfter {
        fn format(&self) -> CaptureFormat {
            CaptureFormat::pcm16(8_000, 1)
        }

        fn read_chunk(&mut self) -> Result<Option<crate::buffering::SampleChunk>> {
            if self.remaining == 0 {
                return Err(SoundLevelError::CaptureLost("device unplugged".into()));
            }
            self.remaining -= 1;
            Ok(Some(crate::buffering::SampleChunk::new(vec![0i16; 1000], 8_000)))
        }
    }

    #[test]
    fn capture_loss_is_reported_once_on_closed() {
        let engine = SoundLevelEngine::new(EngineConfig::default()).unwrap();
        let rx = engine.subscribe();
        engine.start_source(LostAfter { remaining: 20 }).unwrap();
        assert!(engine.wait_closed(Duration::from_secs(5)));
        engine.join();

        let transitions: Vec<_> = rx
            .try_iter()
            .filter_map(|e| e.as_lifecycle().cloned())
            .collect();
        let states: Vec<_> = transitions.iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![
                LifecycleState::Capturing,
                LifecycleState::DrainPending,
                LifecycleState::Closed
            ]
        );
        assert_eq!(transitions[1].detail, None);
        let closed = transitions[2].detail.as_deref().unwrap_or_default();
        assert!(closed.contains("device unplugged"), "{closed}");
        // the captured audio was still analysed
        assert_eq!(engine.diagnostics().samples_captured, 20_000);
        assert!(engine.diagnostics().delayed_events > 0);
    }

    #[test]
    fn stop_before_start_closes() {
        let engine = SoundLevelEngine::new(EngineConfig::default()).unwrap();
        engine.stop();
        assert_eq!(engine.state(), LifecycleState::Closed);
    }

    #[test]
    fn window_too_short_for_source_rate_is_rejected() {
        let mut config = EngineConfig::default();
        config.live.window_secs = 0.0001;
        let engine = SoundLevelEngine::new(config).unwrap();
        let err = engine
            .start_source(BufferSource::new(vec![0; 100], 8_000, 10))
            .unwrap_err();
        assert!(matches!(err, SoundLevelError::InvalidConfig(_)));
        assert_eq!(engine.state(), LifecycleState::Closed);
    }
}
