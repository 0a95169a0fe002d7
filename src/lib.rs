// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)]
// Duplicate match arms

// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains

// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::identity_op)] // e.g., `x + 0`, `x * 1`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`

// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_safety_doc)] // Docs for `unsafe` functions
#![warn(missing_docs)]

//! # AudioStreamer
//!
//! Real-time streaming playback for audio that is produced while it plays:
//! decoded from a file, synthesized, or pulled from memory.
//!
//! A [`SoundStream`] owns a background worker that keeps a ring of three
//! hardware buffers full by reading from a [`DataSource`]. The controlling
//! thread drives the usual transport (`play`, `pause`, `stop`, seeking and
//! looping) and can ask for the playing position and status at any time.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! audio_streamer = "0.1.0"
//! ```
//!
//! ## Features
//!
//! - `wav` (default): WAV decoding through `hound` ([`WavSource`], [`Music::from_wav`])
//! - `playback`: real output devices through `cpal`
//! - `serialization`: `serde` support for the configuration types
//!
//! ## Error Handling
//!
//! Constructors return [`PlaybackResult`] or [`StreamResult`]. Transport calls
//! never fail: problems are logged through `tracing` and resolved into the
//! stream's state, so install a subscriber to see them.
//!
//! ```rust
//! use audio_streamer::{AudioContext, PlaybackError, SoundStream, StreamError, sources::MemorySource};
//!
//! let context = AudioContext::virtual_output();
//! match MemorySource::new(vec![0i16; 3], 2, 44100) {
//!     Ok(source) => {
//!         let _stream = SoundStream::new(&context, source);
//!     }
//!     Err(StreamError::FormatMismatch { expected, actual }) => {
//!         eprintln!("expected {expected}, got {actual}")
//!     }
//!     Err(other) => eprintln!("{}", PlaybackError::from(other)),
//! }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use audio_streamer::{AudioContext, PlaybackState, SoundStream, sources::GeneratorSource};
//! use std::time::Duration;
//!
//! let context = AudioContext::virtual_output();
//! let tone = GeneratorSource::sine(440.0, 44100, 2).with_duration(Duration::from_secs(2));
//! let stream = SoundStream::new(&context, tone).expect("voice");
//!
//! stream.play();
//! while stream.status() == PlaybackState::Playing {
//!     println!("at {:?}", stream.playing_offset());
//!     std::thread::sleep(Duration::from_millis(250));
//! }
//!
//! for event in context.drain_events() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod music;
pub mod playback;
pub mod streaming;

pub use crate::music::Music;
pub use crate::playback::{
    AudioBackend, AudioContext, DeviceEvent, DeviceEventKind, DeviceInfo, HardwareFormat,
    PlaybackDevice, PlaybackError, PlaybackResult, PlaybackState, VirtualBackend,
    VirtualDeviceConfig, VoiceControls,
};
pub use crate::streaming::{
    DataSource, EngineConfig, SoundStream, StreamConfig, StreamError, StreamResult, TimeSpan,
    sources,
};

#[cfg(feature = "playback")]
pub use crate::playback::CpalBackend;
#[cfg(feature = "wav")]
pub use crate::streaming::WavSource;
