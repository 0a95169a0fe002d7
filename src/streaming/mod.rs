//! Streaming engine: data sources, the buffer ring, the worker and the
//! transport controller.
//!
//! A [`SoundStream`] plays audio that is produced while it plays. A
//! background worker keeps a ring of three device buffers full by reading
//! from a [`DataSource`], so sources may be far slower to respond than the
//! hardware is to consume, as long as each read returns within a buffer's
//! worth of time.
//!
//! # Example
//!
//! ```rust,ignore
//! use audio_streamer::streaming::*;
//! use audio_streamer::playback::AudioContext;
//!
//! let context = AudioContext::virtual_output();
//! let source = MemorySource::from_wav("loop.wav")?;
//! let stream = SoundStream::new(&context, source)?;
//! stream.set_loop(true);
//! stream.play();
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! println!("at {:?}", stream.playing_offset());
//! stream.stop();
//! ```

pub mod buffers;
pub mod error;
pub mod sources;
pub mod stream;
pub mod traits;
pub mod worker;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use buffers::{BUFFER_COUNT, BufferRing, BufferSlot, Reclaimed};
pub use error::{StreamError, StreamResult};
pub use sources::{GeneratorConfig, GeneratorSource, MemorySource, SampleSpan, SignalType};
pub use stream::{EngineConfig, SoundStream, StreamConfig};
pub use traits::{DataSource, TimeSpan};
pub use worker::WORKER_THREAD_NAME;

#[cfg(feature = "wav")]
pub use sources::WavSource;
