//! Error types for device bindings and the streaming engine.

use super::traits::BufferHandle;
use crate::streaming::StreamError;

/// Playback-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// Data source failure surfaced while setting up a stream
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Device-related errors
    #[error("Device error: {0}")]
    Device(String),

    /// Device not found or unavailable
    #[error("Device not found: {device_name}")]
    DeviceNotFound { device_name: String },

    /// No hardware format exists for this channel count
    #[error("Unsupported format: no hardware format for {channel_count} channel(s)")]
    UnsupportedFormat { channel_count: u32 },

    /// Operation needs a format set by `initialize` first
    #[error("Stream parameters have not been initialized")]
    NotInitialized,

    /// Handle was never created by this voice (or already released)
    #[error("Unknown buffer handle: {0:?}")]
    UnknownBuffer(BufferHandle),

    /// Backend-specific errors (CPAL, etc.)
    #[error("Backend error: {backend} - {details}")]
    Backend {
        backend: &'static str,
        details: String,
    },

    /// Resource allocation failures
    #[error("Resource allocation failed: {resource} - {reason}")]
    ResourceAllocation {
        resource: &'static str,
        reason: String,
    },
}

impl PlaybackError {
    /// Create a device error
    pub fn device(details: impl Into<String>) -> Self {
        Self::Device(details.into())
    }

    /// Create a device not found error
    pub fn device_not_found(device_name: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device_name: device_name.into(),
        }
    }

    /// Create a backend error
    pub fn backend(backend: &'static str, details: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            details: details.into(),
        }
    }

    /// Create a resource allocation error
    pub fn resource(resource: &'static str, reason: impl Into<String>) -> Self {
        Self::ResourceAllocation {
            resource,
            reason: reason.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// The worker keeps looping after recoverable errors; everything else
    /// only ever comes out of constructors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Device(_) | Self::Backend { .. } | Self::UnknownBuffer(_)
        )
    }

    /// Check if this error indicates a device problem
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::Device(_) | Self::DeviceNotFound { .. } | Self::Backend { .. }
        )
    }

    /// Check if this error is related to audio format issues
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. } | Self::NotInitialized)
    }
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

#[cfg(feature = "playback")]
impl From<cpal::BuildStreamError> for PlaybackError {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::backend("cpal", format!("Failed to build stream: {}", err))
    }
}

#[cfg(feature = "playback")]
impl From<cpal::PlayStreamError> for PlaybackError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::backend("cpal", format!("Failed to play stream: {}", err))
    }
}

#[cfg(feature = "playback")]
impl From<cpal::PauseStreamError> for PlaybackError {
    fn from(err: cpal::PauseStreamError) -> Self {
        Self::backend("cpal", format!("Failed to pause stream: {}", err))
    }
}

#[cfg(feature = "playback")]
impl From<cpal::DefaultStreamConfigError> for PlaybackError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        Self::backend(
            "cpal",
            format!("Failed to get default stream config: {}", err),
        )
    }
}

#[cfg(feature = "playback")]
impl From<cpal::DevicesError> for PlaybackError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::backend("cpal", format!("Failed to enumerate devices: {}", err))
    }
}

#[cfg(feature = "playback")]
impl From<cpal::DeviceNameError> for PlaybackError {
    fn from(err: cpal::DeviceNameError) -> Self {
        Self::backend("cpal", format!("Failed to query device name: {}", err))
    }
}
