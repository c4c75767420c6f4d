use super::{downmix_into, i16_sample_to_unit, CaptureFormat, SampleSource};
use crate::buffering::SampleChunk;
use crate::error::Result;

/// In-memory source delivering a fixed sample buffer in equal chunks.
///
/// The last chunk may be shorter.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Vec<i16>,
    format: CaptureFormat,
    chunk_len: usize,
    position: usize,
    closed: bool,
}

impl BufferSource {
    /// Mono samples.
    pub fn new(samples: Vec<i16>, sample_rate: u32, chunk_len: usize) -> Self {
        Self {
            samples,
            format: CaptureFormat::pcm16(sample_rate, 1),
            chunk_len: chunk_len.max(1),
            position: 0,
            closed: false,
        }
    }

    /// Interleaved samples, downmixed to mono up front.
    pub fn from_interleaved(
        interleaved: &[i16],
        channels: u16,
        sample_rate: u32,
        chunk_len: usize,
    ) -> Self {
        let mut mono = Vec::with_capacity(interleaved.len() / channels.max(1) as usize);
        downmix_into(interleaved, channels as usize, &mut mono, i16_sample_to_unit);
        let mut source = Self::new(mono, sample_rate, chunk_len);
        source.format.channels = channels;
        source
    }

    /// Samples not yet delivered.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl SampleSource for BufferSource {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn read_chunk(&mut self) -> Result<Option<SampleChunk>> {
        if self.closed || self.position >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.position + self.chunk_len).min(self.samples.len());
        let chunk = SampleChunk::new(&self.samples[self.position..end], self.format.sample_rate);
        self.position = end;
        Ok(Some(chunk))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
