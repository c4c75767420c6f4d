//! Sample sources feeding the capture thread.
//!
//! Every source delivers mono signed 16-bit [`SampleChunk`]s at one sample
//! rate. Multi-channel input is downmixed by averaging frames.
//!
//! Sources are built by a [`SourceFactory`] on the capture thread itself:
//! `cpal::Stream` is `!Send` on several platforms, so a device stream must be
//! created and dropped on the thread that reads it.

pub mod memory;
pub mod ring;
pub mod wav;

#[cfg(feature = "audio-cpal")]
pub mod capture;

pub use memory::BufferSource;
pub use ring::RingSource;
pub use wav::WavSource;

#[cfg(feature = "audio-cpal")]
pub use capture::DeviceCapture;

use serde::{Deserialize, Serialize};

use crate::buffering::SampleChunk;
use crate::error::{Result, SoundLevelError};

/// Encoding of the samples a device delivers before conversion to 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Pcm16,
    Float32,
}

/// One (rate, channel count, encoding) capture configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl CaptureFormat {
    pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::Pcm16,
        }
    }
}

/// 44.1 kHz before 48 kHz, mono before stereo, 16-bit PCM.
pub fn default_format_preferences() -> Vec<CaptureFormat> {
    [44_100, 48_000]
        .into_iter()
        .flat_map(|rate| [1, 2].map(|ch| CaptureFormat::pcm16(rate, ch)))
        .collect()
}

/// First entry of `preferences` accepted by `supports`.
pub fn negotiate<F>(preferences: &[CaptureFormat], mut supports: F) -> Result<CaptureFormat>
where
    F: FnMut(&CaptureFormat) -> bool,
{
    preferences
        .iter()
        .find(|format| supports(format))
        .copied()
        .ok_or(SoundLevelError::NoCompatibleFormat)
}

/// A stream of mono 16-bit chunks.
pub trait SampleSource {
    /// Capture format negotiated for this source (before downmix).
    fn format(&self) -> CaptureFormat;

    /// Rate of the delivered samples.
    fn sample_rate(&self) -> u32 {
        self.format().sample_rate
    }

    /// Next chunk in arrival order; `Ok(None)` once the stream has ended.
    ///
    /// A live source that can no longer deliver returns
    /// [`SoundLevelError::CaptureLost`].
    fn read_chunk(&mut self) -> Result<Option<SampleChunk>>;

    /// Stop delivering. Further reads return `Ok(None)`.
    fn close(&mut self) {}
}

/// Opens a source on the capture thread.
pub type SourceFactory = Box<dyn FnOnce() -> Result<Box<dyn SampleSource>> + Send>;

/// Number of samples in a chunk of `chunk_secs` at `sample_rate` (at least 1).
pub fn chunk_len(sample_rate: u32, chunk_secs: f64) -> usize {
    ((sample_rate as f64 * chunk_secs).round() as usize).max(1)
}

/// Average interleaved frames into mono, appending to `out`.
pub fn downmix_into<T, F>(interleaved: &[T], channels: usize, out: &mut Vec<i16>, to_unit: F)
where
    T: Copy,
    F: Fn(T) -> f32,
{
    let channels = channels.max(1);
    if channels == 1 {
        out.extend(interleaved.iter().map(|&s| unit_to_i16(to_unit(s))));
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| to_unit(s)).sum();
        out.push(unit_to_i16(sum / channels as f32));
    }
}

#[inline]
pub fn unit_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
pub fn i16_sample_to_unit(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

#[inline]
pub fn u8_sample_to_unit(sample: u8) -> f32 {
    (sample as f32 - 128.0) / 128.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preferences_are_ordered() {
        let prefs = default_format_preferences();
        assert_eq!(
            prefs,
            vec![
                CaptureFormat::pcm16(44_100, 1),
                CaptureFormat::pcm16(44_100, 2),
                CaptureFormat::pcm16(48_000, 1),
                CaptureFormat::pcm16(48_000, 2),
            ]
        );
    }

    #[test]
    fn negotiate_picks_first_supported() {
        let prefs = default_format_preferences();
        let chosen = negotiate(&prefs, |f| f.sample_rate == 48_000).unwrap();
        assert_eq!(chosen, CaptureFormat::pcm16(48_000, 1));
    }

    #[test]
    fn negotiate_fails_without_match() {
        let err = negotiate(&default_format_preferences(), |_| false).unwrap_err();
        assert!(matches!(err, SoundLevelError::NoCompatibleFormat));
    }

    #[test]
    fn downmix_averages_frames() {
        let mut out = Vec::new();
        downmix_into(&[1000i16, 3000, -200, 200], 2, &mut out, i16_sample_to_unit);
        assert_eq!(out, vec![2000, 0]);
    }

    #[test]
    fn unit_conversion_saturates() {
        assert_eq!(unit_to_i16(2.0), i16::MAX);
        assert_eq!(unit_to_i16(-2.0), i16::MIN);
        assert_eq!(unit_to_i16(i16_sample_to_unit(1234)), 1234);
    }

    #[test]
    fn capture_format_serializes_camel_case() {
        let json = serde_json::to_string(&CaptureFormat::pcm16(44_100, 1)).unwrap();
        assert_eq!(json, r#"{"sampleRate":44100,"channels":1,"encoding":"pcm16"}"#);
    }
}
