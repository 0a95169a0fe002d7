//! In-memory PCM source with loop points.

use crate::stream_error;
use crate::streaming::{
    error::{StreamError, StreamResult},
    traits::{DataSource, TimeSpan},
};
use std::sync::Arc;
use std::time::Duration;

/// A loop region in interleaved samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleSpan {
    pub offset: u64,
    pub length: u64,
}

impl SampleSpan {
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Interleaved 16-bit audio held in memory.
///
/// The sample data is reference counted, so clones are cheap and share it.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Arc<[i16]>,
    channels: u32,
    sample_rate: u32,
    position: u64,
    loop_span: SampleSpan,
    looping: bool,
}

impl MemorySource {
    /// Wrap interleaved samples.
    pub fn new(samples: impl Into<Arc<[i16]>>, channels: u32, sample_rate: u32) -> StreamResult<Self> {
        let samples = samples.into();
        if channels == 0 || sample_rate == 0 {
            return Err(stream_error!(
                InvalidConfig,
                "channels ({}) and sample rate ({}) must be non-zero",
                channels,
                sample_rate
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(StreamError::format_mismatch(
                format!("a multiple of {} samples", channels),
                format!("{} samples", samples.len()),
            ));
        }

        let loop_span = SampleSpan {
            offset: 0,
            length: samples.len() as u64,
        };
        Ok(Self {
            samples,
            channels,
            sample_rate,
            position: 0,
            loop_span,
            looping: false,
        })
    }

    /// Decode a whole WAV file into memory.
    #[cfg(feature = "wav")]
    pub fn from_wav(path: impl AsRef<std::path::Path>) -> StreamResult<Self> {
        let (samples, channels, sample_rate) = super::wav::decode_file(path.as_ref())?;
        Self::new(samples, channels, sample_rate)
    }

    /// Total number of interleaved samples
    pub fn sample_count(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Current read position in interleaved samples
    pub const fn sample_offset(&self) -> u64 {
        self.position
    }

    pub fn duration(&self) -> Duration {
        self.samples_to_time(self.sample_count())
    }

    /// Stop reads at the loop end so the stream can wrap there.
    ///
    /// Mirror the stream's loop flag here; without it the source plays to
    /// the end of the data before wrapping.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub const fn is_looping(&self) -> bool {
        self.looping
    }

    /// Current loop region.
    pub fn loop_points(&self) -> TimeSpan {
        TimeSpan::new(
            self.samples_to_time(self.loop_span.offset),
            self.samples_to_time(self.loop_span.length),
        )
    }

    /// Current loop region in interleaved samples.
    pub const fn loop_span(&self) -> SampleSpan {
        self.loop_span
    }

    /// Validate `points` and convert them to a sample span.
    ///
    /// Both ends are rounded up to whole frames and the length is clamped
    /// to the end of the data.
    pub fn resolve_loop_points(&self, points: TimeSpan) -> StreamResult<SampleSpan> {
        let count = self.sample_count();
        if count == 0 {
            return Err(stream_error!(LoopPoints, "no audio data to loop over"));
        }

        let channels = self.channels as u64;
        let round_up = |samples: u64| samples.div_ceil(channels) * channels;
        let offset = round_up(self.time_to_samples(points.offset));
        let length = round_up(self.time_to_samples(points.length));

        if offset >= count {
            return Err(stream_error!(
                LoopPoints,
                "offset must be within [0, {}ms)",
                self.duration().as_millis()
            ));
        }
        if length == 0 {
            return Err(stream_error!(LoopPoints, "length must be non-zero"));
        }

        Ok(SampleSpan {
            offset,
            length: length.min(count - offset),
        })
    }

    /// Set the loop region. Returns whether it changed.
    pub fn set_loop_points(&mut self, points: TimeSpan) -> StreamResult<bool> {
        let span = self.resolve_loop_points(points)?;
        let changed = span != self.loop_span;
        self.loop_span = span;
        Ok(changed)
    }

    /// Time to samples, rounded to the nearest sample.
    fn time_to_samples(&self, time: Duration) -> u64 {
        let scale = self.sample_rate as u128 * self.channels as u128;
        ((time.as_micros() * scale + 500_000) / 1_000_000) as u64
    }

    fn samples_to_time(&self, samples: u64) -> Duration {
        let scale = self.sample_rate as u64 * self.channels as u64;
        Duration::from_micros(samples * 1_000_000 / scale)
    }
}

impl DataSource for MemorySource {
    fn read(&mut self, buffer: &mut [i16]) -> usize {
        let mut to_fill = buffer.len() as u64;
        let loop_end = self.loop_span.end();

        // Stop short at the loop end so the next read trips the loop hook
        if self.looping
            && self.loop_span.length != 0
            && self.position <= loop_end
            && self.position + to_fill > loop_end
        {
            to_fill = loop_end - self.position;
        }

        let available = self.sample_count().saturating_sub(self.position);
        let count = to_fill.min(available) as usize;
        let start = self.position as usize;
        buffer[..count].copy_from_slice(&self.samples[start..start + count]);
        self.position += count as u64;
        count
    }

    fn seek(&mut self, offset: Duration) -> StreamResult<()> {
        let frames = (offset.as_secs_f64() * self.sample_rate as f64) as u64;
        self.position = (frames * self.channels as u64).min(self.sample_count());
        Ok(())
    }

    fn channel_count(&self) -> u32 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn on_loop(&mut self) -> Option<u64> {
        if self.loop_span.length != 0 && self.position == self.loop_span.end() {
            self.position = self.loop_span.offset;
            Some(self.position)
        } else if self.position >= self.sample_count() {
            self.position = 0;
            Some(0)
        } else {
            None
        }
    }
}
