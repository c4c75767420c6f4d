//! Consumer loop: one per analysis path.
//!
//! ## Per iteration
//!
//! ```text
//! 1. canceled?            → exit without publishing
//! 2. pop one SampleChunk  (arrival order)
//! 3. WindowController::push → zero or more published results
//! 4. publish Live/DelayedMeasure events (skipped once canceled)
//! 5. queue empty + capture drained → flush cached results, exit
//!    queue empty otherwise        → sleep `empty_queue_sleep`
//! ```
//!
//! Each consumer owns its controller and spectral engine; the only shared
//! state is its queue, the session flags and the event bus.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::buffering::ChunkQueue;
use crate::ipc::bus::EventBus;
use crate::ipc::events::{DelayedMeasureEvent, LiveSpectrumEvent, MeasurementEvent};
use crate::spectral::{WindowController, WindowedResult};

/// Which of the two analyses a consumer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisPath {
    Live,
    Delayed,
}

impl AnalysisPath {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisPath::Live => "live",
            AnalysisPath::Delayed => "delayed",
        }
    }
}

/// Flags shared by the capture thread and both consumers.
#[derive(Debug)]
pub struct SessionFlags {
    /// `false` stops capture; queued chunks are still analysed.
    pub recording: AtomicBool,
    /// `true` discards queued chunks and suppresses further publication.
    pub canceled: AtomicBool,
    /// Set by the capture thread after its last push.
    pub capture_done: AtomicBool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            recording: AtomicBool::new(true),
            canceled: AtomicBool::new(false),
            capture_done: AtomicBool::new(false),
        }
    }
}

impl SessionFlags {
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub chunks_captured: AtomicU64,
    pub samples_captured: AtomicU64,
    pub live_evaluations: AtomicU64,
    pub delayed_evaluations: AtomicU64,
    pub live_events: AtomicU64,
    pub delayed_events: AtomicU64,
    pub analysis_errors: AtomicU64,
    pub chunks_discarded: AtomicU64,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> [&AtomicU64; 8] {
        [
            &self.chunks_captured,
            &self.samples_captured,
            &self.live_evaluations,
            &self.delayed_evaluations,
            &self.live_events,
            &self.delayed_events,
            &self.analysis_errors,
            &self.chunks_discarded,
        ]
    }

    fn evaluations(&self, path: AnalysisPath) -> &AtomicU64 {
        match path {
            AnalysisPath::Live => &self.live_evaluations,
            AnalysisPath::Delayed => &self.delayed_evaluations,
        }
    }

    fn events(&self, path: AnalysisPath) -> &AtomicU64 {
        match path {
            AnalysisPath::Live => &self.live_events,
            AnalysisPath::Delayed => &self.delayed_events,
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            samples_captured: self.samples_captured.load(Ordering::Relaxed),
            live_evaluations: self.live_evaluations.load(Ordering::Relaxed),
            delayed_evaluations: self.delayed_evaluations.load(Ordering::Relaxed),
            live_events: self.live_events.load(Ordering::Relaxed),
            delayed_events: self.delayed_events.load(Ordering::Relaxed),
            analysis_errors: self.analysis_errors.load(Ordering::Relaxed),
            chunks_discarded: self.chunks_discarded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_captured: u64,
    pub samples_captured: u64,
    pub live_evaluations: u64,
    pub delayed_evaluations: u64,
    pub live_events: u64,
    pub delayed_events: u64,
    pub analysis_errors: u64,
    pub chunks_discarded: u64,
}

/// Everything a consumer thread owns or shares.
pub struct ConsumerContext {
    pub path: AnalysisPath,
    pub controller: WindowController,
    pub queue: ChunkQueue,
    pub flags: Arc<SessionFlags>,
    /// `true` while a chunk is being analysed.
    pub processing: Arc<AtomicBool>,
    pub bus: Arc<EventBus>,
    pub diagnostics: Arc<PipelineDiagnostics>,
    pub sample_rate: u32,
    /// Unix ms of the first captured sample.
    pub session_start_millis: i64,
    pub empty_queue_sleep: Duration,
}

/// Wall-clock start of a window from the session anchor and its sample offset.
pub fn window_start_millis(session_start_millis: i64, start_sample: u64, sample_rate: u32) -> i64 {
    let offset = (start_sample as u128 * 1000 / sample_rate.max(1) as u128) as i64;
    session_start_millis + offset
}

struct Publisher {
    path: AnalysisPath,
    seq: u64,
}

impl Publisher {
    fn publish(&mut self, ctx: &ConsumerContext, windowed: WindowedResult) {
        if ctx.flags.is_canceled() {
            return;
        }
        self.seq += 1;
        let result = windowed.result;
        let event = match self.path {
            AnalysisPath::Live => MeasurementEvent::LiveSpectrum(LiveSpectrumEvent {
                seq: self.seq,
                fine_spectrum: result.fine_spectrum,
                band_levels: result.band_levels,
                global_level: result.global_level,
            }),
            AnalysisPath::Delayed => MeasurementEvent::DelayedMeasure(DelayedMeasureEvent {
                seq: self.seq,
                band_levels: result.band_levels,
                global_level: result.global_level,
                window_start_time_millis: window_start_millis(
                    ctx.session_start_millis,
                    windowed.window_start_sample,
                    ctx.sample_rate,
                ),
            }),
        };
        ctx.bus.publish(event);
        ctx.diagnostics.events(self.path).fetch_add(1, Ordering::Relaxed);
    }
}

/// Run a consumer until the queue is drained after capture ends, or until
/// the session is canceled.
pub fn run(mut ctx: ConsumerContext) {
    let path = ctx.path;
    info!(
        path = path.as_str(),
        window_len = ctx.controller.window_len(),
        step = ctx.controller.step(),
        "consumer started"
    );
    let mut publisher = Publisher { path, seq: 0 };

    loop {
        if ctx.flags.is_canceled() {
            debug!(path = path.as_str(), "cancellation observed");
            break;
        }

        ctx.processing.store(true, Ordering::Release);
        // read before popping: once set, no chunk can arrive after an empty pop
        let capture_done = ctx.flags.capture_done.load(Ordering::Acquire);

        let Some(chunk) = ctx.queue.pop() else {
            if capture_done {
                if let Some(tail) = ctx.controller.flush() {
                    publisher.publish(&ctx, tail);
                }
                ctx.processing.store(false, Ordering::Release);
                break;
            }
            ctx.processing.store(false, Ordering::Release);
            std::thread::sleep(ctx.empty_queue_sleep);
            continue;
        };

        let before = ctx.controller.evaluations();
        match ctx.controller.push(&chunk.samples) {
            Ok(results) => {
                for windowed in results {
                    publisher.publish(&ctx, windowed);
                }
            }
            Err(e) => {
                ctx.diagnostics
                    .analysis_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!(path = path.as_str(), "analysis failed: {e}");
            }
        }
        ctx.diagnostics
            .evaluations(path)
            .fetch_add(ctx.controller.evaluations() - before, Ordering::Relaxed);
        ctx.processing.store(false, Ordering::Release);
    }

    ctx.processing.store(false, Ordering::Release);
    info!(
        path = path.as_str(),
        evaluations = ctx.controller.evaluations(),
        samples = ctx.controller.samples_pushed(),
        published = publisher.seq,
        "consumer stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::bands::{center_frequencies, BandSet};
    use crate::buffering::SampleChunk;
    use crate::spectral::{SpectralEngine, WindowType};

    const RATE: u32 = 8_000;

    fn context(path: AnalysisPath, overlap: f64) -> (ConsumerContext, crossbeam_channel::Receiver<MeasurementEvent>) {
        let engine = SpectralEngine::new(
            RATE,
            800,
            center_frequencies(BandSet::Reduced, 4_000.0),
            100.0,
        )
        .unwrap();
        let controller =
            WindowController::new(engine, overlap, WindowType::Hann, true, true).unwrap();
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();
        let ctx = ConsumerContext {
            path,
            controller,
            queue: ChunkQueue::new(),
            flags: Arc::new(SessionFlags::default()),
            processing: Arc::new(AtomicBool::new(false)),
            bus,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            sample_rate: RATE,
            session_start_millis: 1_000_000,
            empty_queue_sleep: Duration::from_millis(1),
        };
        (ctx, rx)
    }

    fn noise(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i * 7919) % 2001) as i16 - 1000).collect()
    }

    #[test]
    fn window_start_is_sample_derived() {
        assert_eq!(window_start_millis(1_000, 0, 44_100), 1_000);
        assert_eq!(window_start_millis(1_000, 44_100, 44_100), 2_000);
        assert_eq!(window_start_millis(1_000, 22_050, 44_100), 1_500);
    }

    #[test]
    fn drains_queue_then_flushes_and_exits() {
        let (ctx, rx) = context(AnalysisPath::Delayed, 0.5);
        let queue = ctx.queue.clone();
        let flags = Arc::clone(&ctx.flags);
        let diagnostics = Arc::clone(&ctx.diagnostics);
        for chunk in noise(4_000).chunks(400) {
            queue.push(SampleChunk::new(chunk, RATE));
        }
        flags.capture_done.store(true, Ordering::Release);
        run(ctx);

        let stamps: Vec<i64> = rx
            .try_iter()
            .filter_map(|e| match e {
                MeasurementEvent::DelayedMeasure(m) => Some(m.window_start_time_millis),
                _ => None,
            })
            .collect();
        // evaluations at 800, 1200, ..., 4000 → 9; pairs published, last one flushed
        assert_eq!(diagnostics.snapshot().delayed_evaluations, 9);
        assert_eq!(stamps, vec![1_000_000, 1_000_100, 1_000_200, 1_000_300, 1_000_400]);
        assert!(queue.is_empty());
    }

    #[test]
    fn canceled_consumer_publishes_nothing() {
        let (ctx, rx) = context(AnalysisPath::Live, 0.0);
        for chunk in noise(8_000).chunks(400) {
            ctx.queue.push(SampleChunk::new(chunk, RATE));
        }
        ctx.flags.canceled.store(true, Ordering::Release);
        let queue = ctx.queue.clone();
        run(ctx);
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.len(), 20);
    }

    #[test]
    fn live_events_carry_sequence_numbers() {
        let (ctx, rx) = context(AnalysisPath::Live, 0.0);
        ctx.queue.push(SampleChunk::new(noise(2_400), RATE));
        ctx.flags.capture_done.store(true, Ordering::Release);
        run(ctx);
        let seqs: Vec<u64> = rx
            .try_iter()
            .filter_map(|e| match e {
                MeasurementEvent::LiveSpectrum(live) => Some(live.seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }
}
