//! Core traits for the data-source side of the engine.

use super::error::StreamResult;
use std::time::Duration;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Supplies interleaved signed 16-bit audio to a stream.
///
/// A source is read from the streaming worker thread and seeked from the
/// controlling thread, never both at once. Reads are expected to return
/// promptly: one chunk of decode or synthesis, not a blocking network wait.
pub trait DataSource: Send {
    /// Fill `buffer` with the next samples and return how many were written.
    ///
    /// Returning 0 means the end of the data has been reached. A source that
    /// fails to produce data reports 0 as well.
    fn read(&mut self, buffer: &mut [i16]) -> usize;

    /// Move the read position to `offset` from the start of the data.
    fn seek(&mut self, offset: Duration) -> StreamResult<()>;

    /// Number of interleaved channels
    fn channel_count(&self) -> u32;

    /// Frames per second
    fn sample_rate(&self) -> u32;

    /// Called when the end is reached and the stream is looping.
    ///
    /// Repositions the source for the next pass and returns the sample
    /// offset playback resumes at, or `None` if the source cannot loop.
    fn on_loop(&mut self) -> Option<u64> {
        match self.seek(Duration::ZERO) {
            Ok(()) => Some(0),
            Err(err) => {
                tracing::warn!("Failed to rewind source for looping: {}", err);
                None
            }
        }
    }
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn read(&mut self, buffer: &mut [i16]) -> usize {
        (**self).read(buffer)
    }

    fn seek(&mut self, offset: Duration) -> StreamResult<()> {
        (**self).seek(offset)
    }

    fn channel_count(&self) -> u32 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn on_loop(&mut self) -> Option<u64> {
        (**self).on_loop()
    }
}

/// A span of time: a start offset and a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct TimeSpan {
    pub offset: Duration,
    pub length: Duration,
}

impl TimeSpan {
    pub const fn new(offset: Duration, length: Duration) -> Self {
        Self { offset, length }
    }

    /// End of the span
    pub fn end(&self) -> Duration {
        self.offset.saturating_add(self.length)
    }
}

/// Convert a time offset to an interleaved sample index.
pub(crate) fn time_to_samples(offset: Duration, sample_rate: u32, channel_count: u32) -> u64 {
    ((offset.as_secs_f64() * sample_rate as f64) as u64) * channel_count as u64
}

/// Convert an interleaved sample index back to a time offset.
pub(crate) fn samples_to_time(samples: u64, sample_rate: u32, channel_count: u32) -> Duration {
    if sample_rate == 0 || channel_count == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / sample_rate as f64 / channel_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_sample_conversions() {
        assert_eq!(time_to_samples(Duration::from_secs(2), 44100, 2), 176_400);
        assert_eq!(time_to_samples(Duration::from_millis(500), 1000, 1), 500);
        assert_eq!(
            samples_to_time(176_400, 44100, 2),
            Duration::from_secs(2)
        );
        assert_eq!(samples_to_time(100, 0, 2), Duration::ZERO);
    }

    #[test]
    fn test_time_span_end() {
        let span = TimeSpan::new(Duration::from_secs(1), Duration::from_millis(250));
        assert_eq!(span.end(), Duration::from_millis(1250));
    }
}
