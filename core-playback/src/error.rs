//! # Playback Error Types
//!
//! Error types for the stream ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while feeding, decoding or reading a stream.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Decoder could not be initialized or opened. Not retried.
    #[error("Failed to open decoder: {0}")]
    OpenFailure(String),

    /// Decoder opened but could not report its sample rate or channel layout.
    #[error("Decoder did not report an output format: {0}")]
    FormatQueryFailure(String),

    /// Operation requires an opened decoder session.
    #[error("Decoder session is not open")]
    NotOpened,

    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// A metadata frame declared more bytes than the accumulation bound.
    ///
    /// Recovered locally: the overflow is discarded and the stream continues.
    #[error("Metadata frame of {declared} bytes exceeds the {capacity} byte bound")]
    ProtocolViolation { declared: usize, capacity: usize },

    /// Decoder reported a failure while producing samples.
    #[error("Decoding error ({code}): {message}")]
    DecodeError { code: i32, message: String },

    /// Failed to open or read the byte source.
    #[error("Source error: {0}")]
    SourceError(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Player configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if the session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlaybackError::OpenFailure(_)
                | PlaybackError::FormatQueryFailure(_)
                | PlaybackError::InvalidConfig(_)
        )
    }

    /// Returns `true` if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaybackError::SourceError(_) | PlaybackError::Io(_))
    }

    /// Negative status integer for consumers of the integer `read` contract.
    ///
    /// `-1` is reserved for end of stream, so errors start at `-2` unless the
    /// decoder supplied its own negative code.
    pub fn code(&self) -> i32 {
        match self {
            PlaybackError::DecodeError { code, .. } if *code < -1 => *code,
            PlaybackError::DecodeError { .. } => -2,
            PlaybackError::OpenFailure(_) => -3,
            PlaybackError::FormatQueryFailure(_) => -4,
            PlaybackError::NotOpened => -5,
            PlaybackError::ProtocolViolation { .. } => -6,
            PlaybackError::SourceError(_) | PlaybackError::Io(_) => -7,
            PlaybackError::InvalidConfig(_) => -8,
            PlaybackError::Internal(_) => -9,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PlaybackError::OpenFailure("no handle".into()).is_fatal());
        assert!(PlaybackError::FormatQueryFailure("no rate".into()).is_fatal());
        assert!(!PlaybackError::DecodeError {
            code: -10,
            message: "bad frame".into()
        }
        .is_fatal());
        assert!(!PlaybackError::ProtocolViolation {
            declared: 4080,
            capacity: 64
        }
        .is_fatal());
    }

    #[test]
    fn test_codes_never_collide_with_end_of_stream() {
        let errors = [
            PlaybackError::DecodeError {
                code: -1,
                message: String::new(),
            },
            PlaybackError::DecodeError {
                code: 3,
                message: String::new(),
            },
            PlaybackError::OpenFailure(String::new()),
            PlaybackError::NotOpened,
            PlaybackError::Internal(String::new()),
        ];
        for error in &errors {
            assert!(error.code() < -1, "{error} mapped to {}", error.code());
        }
    }

    #[test]
    fn test_decoder_code_is_preserved() {
        let error = PlaybackError::DecodeError {
            code: -42,
            message: "resync failed".into(),
        };
        assert_eq!(error.code(), -42);
    }
}
