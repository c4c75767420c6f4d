//! Capture (producer) thread: reads the source, fans chunks out to both
//! consumer queues, then drives the drain and the final `Closed` transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

use super::lifecycle::Lifecycle;
use super::pipeline::{PipelineDiagnostics, SessionFlags};
use crate::audio::SampleSource;
use crate::buffering::ChunkQueue;
use crate::ipc::events::LifecycleState;

/// One consumer as seen from the capture thread.
pub struct ConsumerHandle {
    pub name: &'static str,
    pub queue: ChunkQueue,
    pub processing: Arc<AtomicBool>,
    pub thread: JoinHandle<()>,
}

impl ConsumerHandle {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.processing.load(Ordering::Acquire)
    }
}

pub struct CaptureContext {
    pub source: Box<dyn SampleSource>,
    pub consumers: Vec<ConsumerHandle>,
    pub flags: Arc<SessionFlags>,
    pub lifecycle: Arc<Lifecycle>,
    pub diagnostics: Arc<PipelineDiagnostics>,
    pub drain_poll: Duration,
}

/// Run the capture loop and the shutdown sequence. Returns once `Closed` has
/// been published.
pub fn run(ctx: CaptureContext) {
    let CaptureContext {
        mut source,
        consumers,
        flags,
        lifecycle,
        diagnostics,
        drain_poll,
    } = ctx;

    let mut failure: Option<String> = None;

    loop {
        if flags.is_canceled() || !flags.recording.load(Ordering::Acquire) {
            break;
        }
        match source.read_chunk() {
            Ok(Some(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                diagnostics.chunks_captured.fetch_add(1, Ordering::Relaxed);
                diagnostics
                    .samples_captured
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                for consumer in &consumers {
                    consumer.queue.push(chunk.clone());
                }
            }
            Ok(None) => {
                info!("capture source exhausted");
                break;
            }
            Err(e) => {
                error!("capture failed: {e}");
                failure = Some(e.to_string());
                break;
            }
        }
    }

    source.close();
    drop(source);
    flags.recording.store(false, Ordering::Release);
    flags.capture_done.store(true, Ordering::Release);

    if !flags.is_canceled() {
        lifecycle.transition(LifecycleState::DrainPending, None);
        while !flags.is_canceled() && !consumers.iter().all(ConsumerHandle::is_idle) {
            std::thread::sleep(drain_poll);
        }
    }

    for consumer in consumers {
        if flags.is_canceled() {
            let dropped = consumer.queue.clear();
            diagnostics
                .chunks_discarded
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        if consumer.thread.join().is_err() {
            warn!(consumer = consumer.name, "consumer thread panicked");
        }
    }

    let snapshot = diagnostics.snapshot();
    info!(
        chunks = snapshot.chunks_captured,
        samples = snapshot.samples_captured,
        live_events = snapshot.live_events,
        delayed_events = snapshot.delayed_events,
        discarded = snapshot.chunks_discarded,
        "session diagnostics"
    );

    let detail = if flags.is_canceled() {
        Some("canceled".to_string())
    } else {
        failure
    };
    lifecycle.transition(LifecycleState::Closed, detail);
}
