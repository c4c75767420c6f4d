use std::sync::Arc;

/// A short block of mono 16-bit samples, in arrival order.
///
/// The sample storage is shared immutably, so handing one capture block to
/// both consumer queues costs a reference count, not a copy.
#[derive(Debug, Clone)]
pub struct SampleChunk {
    pub samples: Arc<[i16]>,
    pub sample_rate: u32,
}

impl SampleChunk {
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
