//! WAV file source backed by `hound`.
//!
//! Any integer or float WAV is accepted and converted to 16-bit on read.

use crate::streaming::{
    error::{StreamError, StreamResult},
    traits::DataSource,
};
use hound::{SampleFormat, WavReader, WavSpec};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How samples in the file map onto i16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Integer samples of at most 16 bits
    Narrow,
    /// Integer samples wider than 16 bits, shifted down
    Wide { shift: u16 },
    Float,
}

impl Encoding {
    fn of(spec: &WavSpec) -> StreamResult<Self> {
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 1..=16) => Ok(Self::Narrow),
            (SampleFormat::Int, bits @ 17..=32) => Ok(Self::Wide { shift: bits - 16 }),
            (SampleFormat::Float, 32) => Ok(Self::Float),
            (format, bits) => Err(StreamError::format_mismatch(
                "8-32 bit integer or 32-bit float PCM",
                format!("{:?} with {} bits per sample", format, bits),
            )),
        }
    }
}

fn float_to_i16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Read up to `buffer.len()` samples, returning how many were written.
fn read_into<R: std::io::Read>(
    reader: &mut WavReader<R>,
    encoding: Encoding,
    buffer: &mut [i16],
) -> StreamResult<usize> {
    let mut written = 0;
    match encoding {
        Encoding::Narrow => {
            for (slot, sample) in buffer.iter_mut().zip(reader.samples::<i16>()) {
                *slot = sample?;
                written += 1;
            }
        }
        Encoding::Wide { shift } => {
            for (slot, sample) in buffer.iter_mut().zip(reader.samples::<i32>()) {
                *slot = (sample? >> shift) as i16;
                written += 1;
            }
        }
        Encoding::Float => {
            for (slot, sample) in buffer.iter_mut().zip(reader.samples::<f32>()) {
                *slot = float_to_i16(sample?);
                written += 1;
            }
        }
    }
    Ok(written)
}

/// Decode a whole file to interleaved i16, returning samples, channels and
/// sample rate.
pub(crate) fn decode_file(path: &Path) -> StreamResult<(Vec<i16>, u32, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let encoding = Encoding::of(&spec)?;

    let mut samples = vec![0i16; reader.len() as usize];
    let read = read_into(&mut reader, encoding, &mut samples)?;
    samples.truncate(read);
    tracing::debug!(
        "Decoded {} samples from {}",
        samples.len(),
        path.display()
    );
    Ok((samples, spec.channels as u32, spec.sample_rate))
}

/// Streams a WAV file from disk.
pub struct WavSource {
    path: PathBuf,
    reader: WavReader<BufReader<File>>,
    spec: WavSpec,
    encoding: Encoding,
}

impl WavSource {
    /// Open `path` for streaming.
    pub fn open(path: impl AsRef<Path>) -> StreamResult<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = WavReader::open(&path)?;
        let spec = reader.spec();
        let encoding = Encoding::of(&spec)?;
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "{} declares {} channels at {} Hz",
                path.display(),
                spec.channels,
                spec.sample_rate
            )));
        }
        Ok(Self {
            path,
            reader,
            spec,
            encoding,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the file
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.reader.duration() as f64 / self.spec.sample_rate as f64)
    }

    /// Total number of interleaved samples
    pub fn sample_count(&self) -> u64 {
        self.reader.len() as u64
    }
}

impl DataSource for WavSource {
    fn read(&mut self, buffer: &mut [i16]) -> usize {
        match read_into(&mut self.reader, self.encoding, buffer) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("Failed to decode {}: {}", self.path.display(), err);
                0
            }
        }
    }

    fn seek(&mut self, offset: Duration) -> StreamResult<()> {
        let frame = (offset.as_secs_f64() * self.spec.sample_rate as f64) as u64;
        let frame = frame.min(self.reader.duration() as u64) as u32;
        self.reader
            .seek(frame)
            .map_err(|e| StreamError::seek(offset, e.to_string()))
    }

    fn channel_count(&self) -> u32 {
        self.spec.channels as u32
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }
}

impl std::fmt::Debug for WavSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavSource")
            .field("path", &self.path)
            .field("spec", &self.spec)
            .finish()
    }
}
