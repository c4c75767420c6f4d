//! Sample buffering between capture and analysis.
//!
//! - [`create_sample_ring`]: lock-free SPSC ring (`ringbuf::HeapRb<i16>`) for the
//!   real-time device callback, whose `push_slice` never blocks.
//! - [`ChunkQueue`]: unbounded FIFO of [`SampleChunk`]s, one per consumer.

pub mod chunk;
pub mod queue;

use ringbuf::{traits::Split, HeapRb};

pub use chunk::SampleChunk;
pub use queue::ChunkQueue;
pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the device callback.
pub type SampleProducer = ringbuf::HeapProd<i16>;

/// Consumer half, held by the capture thread.
pub type SampleConsumer = ringbuf::HeapCons<i16>;

/// 2^21 samples, about 47 s at 44.1 kHz.
pub const RING_CAPACITY: usize = 1 << 21;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<i16>::new(capacity.max(1)).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_preserves_order_and_reports_overflow() {
        let (mut prod, mut cons) = create_sample_ring(4);
        assert_eq!(prod.push_slice(&[1, 2, 3, 4, 5]), 4);
        let mut out = [0i16; 8];
        let n = cons.pop_slice(&mut out);
        assert_eq!(&out[..n], &[1, 2, 3, 4]);
        assert!(cons.is_empty());
    }
}
