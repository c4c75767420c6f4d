use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;

use super::{downmix_into, CaptureFormat, SampleEncoding, SampleSource};
use crate::buffering::SampleChunk;
use crate::error::{Result, SoundLevelError};

/// Streams a WAV file as mono 16-bit chunks.
///
/// Integer files of any depth are rescaled to 16 bits; float files are
/// clamped to full scale.
pub struct WavSource {
    reader: hound::WavReader<BufReader<File>>,
    spec: hound::WavSpec,
    chunk_frames: usize,
    interleaved: Vec<f32>,
    closed: bool,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>, chunk_secs: f64) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(SoundLevelError::InvalidConfig(format!(
                "{} has no audio channels",
                path.display()
            )));
        }
        let chunk_frames = super::chunk_len(spec.sample_rate, chunk_secs);
        info!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            duration_frames = reader.duration(),
            "opened WAV source"
        );
        Ok(Self {
            reader,
            spec,
            chunk_frames,
            interleaved: Vec::with_capacity(chunk_frames * spec.channels as usize),
            closed: false,
        })
    }

    /// Total frames in the file.
    pub fn duration_frames(&self) -> u32 {
        self.reader.duration()
    }

    fn fill_interleaved(&mut self) -> Result<()> {
        let wanted = self.chunk_frames * self.spec.channels as usize;
        self.interleaved.clear();
        match self.spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    self.interleaved.push(sample?);
                }
            }
            hound::SampleFormat::Int if self.spec.bits_per_sample <= 16 => {
                let scale = (1_i32 << (self.spec.bits_per_sample.max(1) - 1)) as f32;
                for sample in self.reader.samples::<i16>().take(wanted) {
                    self.interleaved.push(sample? as f32 / scale);
                }
            }
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (self.spec.bits_per_sample - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    self.interleaved.push(sample? as f32 / scale);
                }
            }
        }
        Ok(())
    }
}

impl SampleSource for WavSource {
    fn format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.spec.sample_rate,
            channels: self.spec.channels,
            encoding: match self.spec.sample_format {
                hound::SampleFormat::Float => SampleEncoding::Float32,
                hound::SampleFormat::Int => SampleEncoding::Pcm16,
            },
        }
    }

    fn read_chunk(&mut self) -> Result<Option<SampleChunk>> {
        if self.closed {
            return Ok(None);
        }
        self.fill_interleaved()?;
        if self.interleaved.is_empty() {
            return Ok(None);
        }
        let mut mono = Vec::with_capacity(self.chunk_frames);
        downmix_into(&self.interleaved, self.spec.channels as usize, &mut mono, |s| s);
        Ok(Some(SampleChunk::new(mono, self.spec.sample_rate)))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Write mono 16-bit samples to a WAV file.
pub fn write_wav_mono(path: impl AsRef<Path>, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("soundlevel-{}-{name}.wav", std::process::id()))
    }

    #[test]
    fn reads_mono_file_in_chunks() {
        let path = temp_path("mono");
        let samples: Vec<i16> = (0..1000).map(|i| (i * 7 % 2000 - 1000) as i16).collect();
        write_wav_mono(&path, &samples, 8000).unwrap();

        let mut source = WavSource::open(&path, 0.05).unwrap();
        assert_eq!(source.sample_rate(), 8000);
        let mut read = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = source.read_chunk().unwrap() {
            assert!(chunk.len() <= 400);
            read.extend_from_slice(&chunk.samples);
            chunks += 1;
        }
        assert_eq!(chunks, 3);
        assert_eq!(read, samples);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stereo_file_is_downmixed() {
        let path = temp_path("stereo");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(1000i16).unwrap();
            writer.write_sample(3000i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavSource::open(&path, 1.0).unwrap();
        assert_eq!(source.format().channels, 2);
        let chunk = source.read_chunk().unwrap().unwrap();
        assert_eq!(chunk.len(), 100);
        assert!(chunk.samples.iter().all(|&s| s == 2000));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(WavSource::open("/definitely/not/here.wav", 0.1).is_err());
    }
}
