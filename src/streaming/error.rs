//! Error types for data-source operations.

use std::time::Duration;

/// Errors raised by a [`DataSource`](super::traits::DataSource).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying reader failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source configuration is unusable (zero channels, zero rate, ...)
    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),

    /// Seeking to the requested position failed
    #[error("Seek to {}ms failed: {details}", position.as_millis())]
    Seek { position: Duration, details: String },

    /// Stream format mismatch
    #[error("Format mismatch: expected {expected}, got {actual}")]
    FormatMismatch { expected: String, actual: String },

    /// Loop points rejected by the source
    #[error("Invalid loop points: {0}")]
    LoopPoints(String),

    /// WAV decoding error
    #[cfg(feature = "wav")]
    #[error("Decode error: {0}")]
    Decode(#[from] hound::Error),
}

impl StreamError {
    /// Create a seek error
    pub fn seek(position: Duration, details: impl Into<String>) -> Self {
        Self::Seek {
            position,
            details: details.into(),
        }
    }

    /// Create a format mismatch error
    pub fn format_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::FormatMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Check if the source can keep streaming after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Seek { .. } | Self::LoopPoints(_))
    }

    /// Check if this error should end the stream
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

/// Result type for data-source operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Helper macro for creating stream errors
#[macro_export]
macro_rules! stream_error {
    ($kind:ident, $($args:tt)*) => {
        $crate::streaming::StreamError::$kind(format!($($args)*))
    };
}
