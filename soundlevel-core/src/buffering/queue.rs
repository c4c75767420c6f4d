use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::SampleChunk;

#[derive(Debug, Default)]
struct Inner {
    chunks: Mutex<VecDeque<SampleChunk>>,
    queued_samples: AtomicU64,
    pushed_chunks: AtomicU64,
}

/// Unbounded single-producer/single-consumer chunk FIFO.
///
/// A coarse mutex is enough at capture-block rates. Cloning yields another
/// handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct ChunkQueue {
    inner: Arc<Inner>,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append without blocking on the consumer.
    pub fn push(&self, chunk: SampleChunk) {
        let len = chunk.len() as u64;
        // counters change only while the lock is held
        let mut chunks = self.inner.chunks.lock();
        chunks.push_back(chunk);
        self.inner.queued_samples.fetch_add(len, Ordering::AcqRel);
        self.inner.pushed_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pop(&self) -> Option<SampleChunk> {
        let mut chunks = self.inner.chunks.lock();
        let chunk = chunks.pop_front()?;
        self.inner
            .queued_samples
            .fetch_sub(chunk.len() as u64, Ordering::AcqRel);
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        self.inner.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.chunks.lock().is_empty()
    }

    /// Samples waiting to be analysed.
    pub fn queued_samples(&self) -> u64 {
        self.inner.queued_samples.load(Ordering::Acquire)
    }

    pub fn pushed_chunks(&self) -> u64 {
        self.inner.pushed_chunks.load(Ordering::Relaxed)
    }

    /// Drop everything still queued; returns the number of chunks discarded.
    pub fn clear(&self) -> usize {
        let mut chunks = self.inner.chunks.lock();
        let dropped = chunks.len();
        chunks.clear();
        self.inner.queued_samples.store(0, Ordering::Release);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_sample_accounting() {
        let queue = ChunkQueue::new();
        queue.push(SampleChunk::new(vec![1i16, 2, 3], 8000));
        queue.push(SampleChunk::new(vec![4i16, 5], 8000));
        assert_eq!(queue.queued_samples(), 5);
        assert_eq!(&queue.pop().unwrap().samples[..], &[1, 2, 3]);
        assert_eq!(queue.queued_samples(), 2);
        assert_eq!(&queue.pop().unwrap().samples[..], &[4, 5]);
        assert!(queue.pop().is_none());
        assert_eq!(queue.pushed_chunks(), 2);
    }

    #[test]
    fn clones_share_storage() {
        let a = ChunkQueue::new();
        let b = a.clone();
        a.push(SampleChunk::new(vec![0i16; 10], 8000));
        assert_eq!(b.len(), 1);
        assert_eq!(b.clear(), 1);
        assert!(a.is_empty());
        assert_eq!(a.queued_samples(), 0);
    }

    #[test]
    fn sample_count_never_underflows_under_concurrent_pop() {
        const CHUNKS: u64 = 200_000;
        let queue = ChunkQueue::new();
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for _ in 0..CHUNKS {
                    queue.push(SampleChunk::new(vec![0i16; 100], 8000));
                }
            })
        };

        let mut popped = 0u64;
        let mut max_seen = 0u64;
        while popped < CHUNKS {
            if queue.pop().is_some() {
                popped += 1;
                max_seen = max_seen.max(queue.queued_samples());
            }
        }
        producer.join().unwrap();

        assert!(max_seen <= CHUNKS * 100, "queued_samples wrapped: {max_seen}");
        assert_eq!(queue.queued_samples(), 0);
        assert_eq!(queue.pushed_chunks(), CHUNKS);
    }
}
