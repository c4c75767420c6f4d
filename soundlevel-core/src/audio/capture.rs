//! Live input capture through cpal.
//!
//! The input callback runs on an OS audio thread and must not block, so it
//! only converts and downmixes into a reusable buffer and pushes into the
//! lock-free sample ring. The capture thread reads the ring through a
//! [`RingSource`].
//!
//! `cpal::Stream` is `!Send` on Windows and macOS: create and drop a
//! [`DeviceCapture`] on the same thread (see [`super::SourceFactory`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use tracing::{error, info, warn};

use super::ring::RingSource;
use super::{
    chunk_len, downmix_into, i16_sample_to_unit, negotiate, u8_sample_to_unit, CaptureFormat,
    SampleEncoding, SampleSource,
};
use crate::buffering::{create_sample_ring, Producer, SampleChunk, RING_CAPACITY};
use crate::error::{Result, SoundLevelError};

/// An open input stream plus the ring it feeds.
pub struct DeviceCapture {
    _stream: Stream,
    source: RingSource,
    running: Arc<AtomicBool>,
    device_name: String,
}

fn device_format_for(
    ranges: &[SupportedStreamConfigRange],
    wanted: &CaptureFormat,
) -> Option<SampleFormat> {
    let accepts = |format: SampleFormat| match wanted.encoding {
        SampleEncoding::Pcm16 => matches!(
            format,
            SampleFormat::I16 | SampleFormat::F32 | SampleFormat::U8
        ),
        SampleEncoding::Float32 => format == SampleFormat::F32,
    };
    let mut candidates: Vec<SampleFormat> = ranges
        .iter()
        .filter(|r| {
            r.channels() == wanted.channels
                && r.min_sample_rate().0 <= wanted.sample_rate
                && wanted.sample_rate <= r.max_sample_rate().0
                && accepts(r.sample_format())
        })
        .map(|r| r.sample_format())
        .collect();
    // native 16-bit first
    candidates.sort_by_key(|f| match f {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        _ => 2,
    });
    candidates.first().copied()
}

fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    if let Some(preferred) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) =
                    devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false))
                {
                    return Ok(device);
                }
                warn!(device = preferred, "preferred input device not found, falling back");
            }
            Err(e) => warn!("failed to list input devices: {e}"),
        }
    }
    if let Some(device) = host.default_input_device() {
        return Ok(device);
    }
    let mut devices = host
        .input_devices()
        .map_err(|e| SoundLevelError::AudioDevice(e.to_string()))?;
    devices
        .next()
        .ok_or_else(|| SoundLevelError::AudioDevice("no input device available".into()))
}

impl DeviceCapture {
    /// Open an input device (by name, else the default) with the first format
    /// of `preferences` it supports.
    ///
    /// # Errors
    /// [`SoundLevelError::NoCompatibleFormat`] when the device supports none of
    /// the preferred formats; [`SoundLevelError::AudioStream`] when cpal fails
    /// to build or start the stream.
    pub fn open(
        device_name: Option<&str>,
        preferences: &[CaptureFormat],
        chunk_secs: f64,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_device(&host, device_name)?;
        let name = device.name().unwrap_or_default();

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| SoundLevelError::AudioDevice(e.to_string()))?
            .collect();
        let format = negotiate(preferences, |f| device_format_for(&ranges, f).is_some())?;
        let sample_format =
            device_format_for(&ranges, &format).ok_or(SoundLevelError::NoCompatibleFormat)?;

        info!(
            device = name.as_str(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            ?sample_format,
            "capture format negotiated"
        );

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (mut producer, consumer) = create_sample_ring(RING_CAPACITY);
        let (source, handle) =
            RingSource::new(consumer, format, chunk_len(format.sample_rate, chunk_secs));
        let running = Arc::new(AtomicBool::new(true));
        let channels = format.channels as usize;

        let on_error = {
            let handle = handle.clone();
            move |err: cpal::StreamError| {
                error!("audio stream error: {err}");
                handle.fail(err.to_string());
            }
        };

        let mut mix: Vec<i16> = Vec::new();
        let flag = Arc::clone(&running);
        let mut forward = move |mix: &mut Vec<i16>| {
            let written = producer.push_slice(mix);
            if written < mix.len() {
                warn!(dropped = mix.len() - written, "sample ring full");
            }
            mix.clear();
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if !flag.load(Ordering::Relaxed) {
                        return;
                    }
                    downmix_into(data, channels, &mut mix, i16_sample_to_unit);
                    forward(&mut mix);
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if !flag.load(Ordering::Relaxed) {
                        return;
                    }
                    downmix_into(data, channels, &mut mix, |s| s);
                    forward(&mut mix);
                },
                on_error,
                None,
            ),
            SampleFormat::U8 => device.build_input_stream(
                &config,
                move |data: &[u8], _info| {
                    if !flag.load(Ordering::Relaxed) {
                        return;
                    }
                    downmix_into(data, channels, &mut mix, u8_sample_to_unit);
                    forward(&mut mix);
                },
                on_error,
                None,
            ),
            other => {
                return Err(SoundLevelError::AudioStream(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| SoundLevelError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SoundLevelError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            source,
            running,
            device_name: name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl SampleSource for DeviceCapture {
    fn format(&self) -> CaptureFormat {
        self.source.format()
    }

    fn read_chunk(&mut self) -> Result<Option<SampleChunk>> {
        self.source.read_chunk()
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        self.source.close();
    }
}

/// Names of the available input devices.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}
