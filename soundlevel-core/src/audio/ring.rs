use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{CaptureFormat, SampleSource};
use crate::buffering::{Consumer, Observer, SampleChunk, SampleConsumer};
use crate::error::{Result, SoundLevelError};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Default time without any sample before a live source is declared lost.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Signals {
    failure: Mutex<Option<String>>,
    finished: AtomicBool,
}

/// Writer-side handle used to report stream failure or end of stream.
#[derive(Debug, Clone)]
pub struct RingHandle {
    signals: Arc<Signals>,
}

impl RingHandle {
    /// Record a fatal stream error. The first message wins.
    pub fn fail(&self, message: impl Into<String>) {
        let mut failure = self.signals.failure.lock();
        if failure.is_none() {
            *failure = Some(message.into());
        }
    }

    /// No more samples will be written.
    pub fn finish(&self) {
        self.signals.finished.store(true, Ordering::Release);
    }
}

/// Reads fixed-size chunks out of a lock-free sample ring filled by another
/// thread (typically a device callback).
pub struct RingSource {
    consumer: SampleConsumer,
    format: CaptureFormat,
    chunk_len: usize,
    stall_timeout: Duration,
    signals: Arc<Signals>,
    scratch: Vec<i16>,
    closed: bool,
}

impl RingSource {
    pub fn new(
        consumer: SampleConsumer,
        format: CaptureFormat,
        chunk_len: usize,
    ) -> (Self, RingHandle) {
        let signals = Arc::new(Signals::default());
        let chunk_len = chunk_len.max(1);
        let source = Self {
            consumer,
            format,
            chunk_len,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            signals: Arc::clone(&signals),
            scratch: vec![0; chunk_len],
            closed: false,
        };
        (source, RingHandle { signals })
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    fn take(&mut self, n: usize) -> SampleChunk {
        let read = self.consumer.pop_slice(&mut self.scratch[..n]);
        SampleChunk::new(&self.scratch[..read], self.format.sample_rate)
    }
}

impl SampleSource for RingSource {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn read_chunk(&mut self) -> Result<Option<SampleChunk>> {
        let started = Instant::now();
        loop {
            if self.closed {
                return Ok(None);
            }
            if let Some(message) = self.signals.failure.lock().clone() {
                return Err(SoundLevelError::CaptureLost(message));
            }
            let available = self.consumer.occupied_len();
            if available >= self.chunk_len {
                return Ok(Some(self.take(self.chunk_len)));
            }
            if self.signals.finished.load(Ordering::Acquire) {
                if available == 0 {
                    return Ok(None);
                }
                return Ok(Some(self.take(available)));
            }
            if started.elapsed() >= self.stall_timeout {
                return Err(SoundLevelError::CaptureLost(format!(
                    "no samples received for {:.1}s",
                    self.stall_timeout.as_secs_f64()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{create_sample_ring, Producer};

    #[test]
    fn reads_full_chunks_then_remainder() {
        let (mut prod, cons) = create_sample_ring(64);
        let (mut source, handle) = RingSource::new(cons, CaptureFormat::pcm16(8000, 1), 4);
        prod.push_slice(&[1, 2, 3, 4, 5, 6]);
        handle.finish();
        assert_eq!(&source.read_chunk().unwrap().unwrap().samples[..], &[1, 2, 3, 4]);
        assert_eq!(&source.read_chunk().unwrap().unwrap().samples[..], &[5, 6]);
        assert!(source.read_chunk().unwrap().is_none());
    }

    #[test]
    fn failure_surfaces_as_capture_lost() {
        let (_prod, cons) = create_sample_ring(64);
        let (mut source, handle) = RingSource::new(cons, CaptureFormat::pcm16(8000, 1), 4);
        handle.fail("device unplugged");
        handle.fail("second error");
        match source.read_chunk() {
            Err(SoundLevelError::CaptureLost(msg)) => assert_eq!(msg, "device unplugged"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stalled_ring_times_out() {
        let (_prod, cons) = create_sample_ring(64);
        let (source, _handle) = RingSource::new(cons, CaptureFormat::pcm16(8000, 1), 4);
        let mut source = source.with_stall_timeout(Duration::from_millis(20));
        assert!(matches!(
            source.read_chunk(),
            Err(SoundLevelError::CaptureLost(_))
        ));
    }
}
