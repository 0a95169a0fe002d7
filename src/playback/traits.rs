//! Core traits for the device side of the engine.
//!
//! A [`PlaybackDevice`] is one hardware voice with a queue of buffers, the
//! model OpenAL-style APIs expose: the engine creates a few buffer handles,
//! queues filled ones, and later asks which of them the hardware has
//! finished with.

use super::devices::EventSink;
use super::error::PlaybackResult;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Current state of a voice or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum PlaybackState {
    /// Not playing; queued audio is not being consumed
    #[default]
    Stopped,
    /// Paused; resumes where it left off
    Paused,
    /// Consuming queued audio
    Playing,
}

impl PlaybackState {
    /// Check if playback is active
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Check if playback can be started/resumed
    pub const fn can_play(self) -> bool {
        matches!(self, Self::Paused | Self::Stopped)
    }

    /// Check if playback can be paused
    pub const fn can_pause(self) -> bool {
        matches!(self, Self::Playing)
    }

    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Paused => 1,
            Self::Playing => 2,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Paused,
            2 => Self::Playing,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Opaque handle to a hardware buffer owned by a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Identifies a voice within an [`AudioContext`](super::devices::AudioContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

/// Hardware sample layout for interleaved signed 16-bit audio.
///
/// Derived from the channel count; counts with no layout (3, 5, 9+, ...)
/// cannot be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum HardwareFormat {
    /// 1 channel
    Mono16,
    /// 2 channels
    Stereo16,
    /// 4 channels
    Quad16,
    /// 6 channels (5.1)
    Surround51,
    /// 7 channels (6.1)
    Surround61,
    /// 8 channels (7.1)
    Surround71,
}

impl HardwareFormat {
    /// Look up the layout for a channel count.
    pub const fn from_channel_count(channel_count: u32) -> Option<Self> {
        match channel_count {
            1 => Some(Self::Mono16),
            2 => Some(Self::Stereo16),
            4 => Some(Self::Quad16),
            6 => Some(Self::Surround51),
            7 => Some(Self::Surround61),
            8 => Some(Self::Surround71),
            _ => None,
        }
    }

    /// Number of interleaved channels in one frame
    pub const fn channel_count(self) -> u32 {
        match self {
            Self::Mono16 => 1,
            Self::Stereo16 => 2,
            Self::Quad16 => 4,
            Self::Surround51 => 6,
            Self::Surround61 => 7,
            Self::Surround71 => 8,
        }
    }

    /// Backend tag for this layout (never 0).
    pub const fn tag(self) -> u32 {
        match self {
            Self::Mono16 => 0x1101,
            Self::Stereo16 => 0x1103,
            Self::Quad16 => 0x1205,
            Self::Surround51 => 0x120B,
            Self::Surround61 => 0x120E,
            Self::Surround71 => 0x1211,
        }
    }

    /// Tag for a channel count, 0 when unsupported.
    pub const fn tag_for(channel_count: u32) -> u32 {
        match Self::from_channel_count(channel_count) {
            Some(format) => format.tag(),
            None => 0,
        }
    }
}

/// Per-voice output controls.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct VoiceControls {
    /// Gain, 0.0 (mute) to 1.0 (full volume)
    pub volume: f64,
    /// Stereo balance, -1.0 (left only) to 1.0 (right only)
    pub pan: f64,
    /// Playback speed factor; also shifts the perceived pitch
    pub pitch: f64,
}

impl Default for VoiceControls {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
        }
    }
}

impl VoiceControls {
    /// Set the volume, clamped to 0.0..=1.0.
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Set the pan, clamped to -1.0..=1.0.
    pub fn with_pan(mut self, pan: f64) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }

    /// Set the pitch. Non-positive or non-finite factors are ignored.
    pub fn with_pitch(mut self, pitch: f64) -> Self {
        if pitch.is_finite() && pitch > 0.0 {
            self.pitch = pitch;
        } else {
            tracing::warn!("Ignoring invalid pitch {}", pitch);
        }
        self
    }

    /// Gains for the left and right channels, volume included.
    pub fn channel_gains(&self) -> (f32, f32) {
        let left = (1.0 - self.pan).min(1.0);
        let right = (1.0 + self.pan).min(1.0);
        ((self.volume * left) as f32, (self.volume * right) as f32)
    }
}

/// One hardware voice with a buffer queue.
///
/// All methods take `&self`: the streaming worker and the controlling thread
/// call into the same voice concurrently, so implementations synchronise
/// internally. Failures are reported through the returned error; the engine
/// logs them and keeps going.
pub trait PlaybackDevice: Send + Sync {
    /// Allocate `count` buffer handles.
    fn create_buffers(&self, count: usize) -> PlaybackResult<Vec<BufferHandle>>;

    /// Copy `samples` into `buffer` and append it to the play queue.
    fn queue(
        &self,
        buffer: BufferHandle,
        samples: &[i16],
        format: HardwareFormat,
        sample_rate: u32,
    ) -> PlaybackResult<()>;

    /// Remove and return the buffers the hardware has finished playing,
    /// oldest first.
    fn unqueue_finished(&self) -> PlaybackResult<Vec<BufferHandle>>;

    /// Remove every buffer from the queue, finished or not.
    fn unqueue_all(&self) -> PlaybackResult<Vec<BufferHandle>>;

    /// Detach and free buffer handles.
    fn release_buffers(&self, buffers: &[BufferHandle]) -> PlaybackResult<()>;

    /// Start or resume consuming the queue.
    fn play(&self) -> PlaybackResult<()>;

    /// Pause without discarding the queue.
    fn pause(&self) -> PlaybackResult<()>;

    /// Stop; everything still queued counts as finished.
    fn stop(&self) -> PlaybackResult<()>;

    /// Current hardware state. A playing voice that runs out of queued
    /// audio reports [`PlaybackState::Stopped`].
    fn status(&self) -> PlaybackState;

    /// Time played since the start of the oldest buffer still in the
    /// queue, counting finished buffers that have not been unqueued yet.
    fn elapsed_in_current_buffer(&self) -> Duration;

    /// Apply volume, pan and pitch to everything the voice plays from now on.
    fn set_controls(&self, controls: VoiceControls) -> PlaybackResult<()>;

    /// Controls currently applied
    fn controls(&self) -> VoiceControls;
}

/// Information about an output device offered by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Something that can open voices: a host audio API or a software device.
pub trait AudioBackend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// List the output devices this backend can open.
    fn devices(&self) -> PlaybackResult<Vec<DeviceInfo>>;

    /// Open a new voice on `device` (`None` for the default device).
    fn open_voice(
        &self,
        device: Option<&str>,
        events: EventSink,
    ) -> PlaybackResult<Arc<dyn PlaybackDevice>>;
}
