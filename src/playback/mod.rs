//! Device side of the streaming engine.
//!
//! This module provides:
//! - The [`PlaybackDevice`] trait: one hardware voice with a buffer queue
//! - An explicit [`AudioContext`] that opens voices and collects device events
//! - A software [`VirtualDevice`] for headless playback and tests
//! - A cpal-backed [`CpalDevice`](cpal_device::CpalDevice) (feature `playback`)
//!
//! # Example
//!
//! ```rust,ignore
//! use audio_streamer::playback::*;
//!
//! let context = AudioContext::default_output();
//! for device in context.devices()? {
//!     println!("{} (default: {})", device.name, device.is_default);
//! }
//! let (id, voice) = context.open_voice()?;
//!
//! while let Some(event) = context.poll_event() {
//!     println!("{:?}: {:?}", event.voice, event.kind);
//! }
//! ```

pub mod devices;
pub mod error;
pub mod traits;
pub mod virtual_device;
pub mod voice_queue;

#[cfg(feature = "playback")]
pub mod cpal_device;

// Re-export main types for convenience
pub use devices::{AudioContext, DeviceEvent, DeviceEventKind, EventSink};
pub use error::{PlaybackError, PlaybackResult};
pub use traits::{
    AudioBackend, BufferHandle, DeviceInfo, HardwareFormat, PlaybackDevice, PlaybackState,
    VoiceControls, VoiceId,
};
pub use virtual_device::{VirtualBackend, VirtualDevice, VirtualDeviceConfig};

#[cfg(feature = "playback")]
pub use cpal_device::{CpalBackend, CpalDevice};
