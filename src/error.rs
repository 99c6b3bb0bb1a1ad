//! Error types for ITCH decoding and order book reconstruction.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.
//! Book-consistency problems are *not* errors: they are recoverable anomalies
//! reported through [`crate::lob::BookAnomaly`] and counted by the engine.

use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, ItchError>;

/// Main error type for decoding and reconstruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItchError {
    /// A field read would run past the end of its byte window.
    #[error("Truncated field: need {width} bytes at offset {offset}, window has {available}")]
    TruncatedField {
        offset: usize,
        width: usize,
        available: usize,
    },

    /// Type tag not present in the ITCH 5.0 message table.
    #[error("Unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),

    /// Body length does not match the fixed layout for its tag.
    #[error("Malformed '{}' message: expected {expected_len} bytes, got {actual_len}", tag_char(.tag))]
    MalformedMessage {
        tag: u8,
        expected_len: usize,
        actual_len: usize,
    },

    /// A field holds a value outside its documented domain (e.g. a side byte).
    #[error("Invalid field '{field}' in '{}' message: 0x{value:02x}", tag_char(.tag))]
    InvalidField {
        tag: u8,
        field: &'static str,
        value: u8,
    },

    /// Length prefix is zero or runs past the end of the input.
    #[error("Truncated stream at offset {offset}")]
    TruncatedStream { offset: u64 },

    /// Source read failure; `offset` is the last fully consumed byte offset.
    #[error("IO error at offset {offset}: {message}")]
    Io { offset: u64, message: String },

    /// Persistence sink failure; `offset` is the last committed byte offset.
    #[error("Sink error after offset {offset}: {message}")]
    Sink { offset: u64, message: String },

    /// Book invariant violated (only surfaced by explicit invariant checks)
    #[error("Book inconsistency: {0}")]
    InconsistentState(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

fn tag_char(tag: &u8) -> char {
    *tag as char
}

impl ItchError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        ItchError::Generic(msg.into())
    }

    /// Wrap an I/O error with the offset the source had reached.
    pub fn io_at(offset: u64, err: &std::io::Error) -> Self {
        ItchError::Io {
            offset,
            message: err.to_string(),
        }
    }

    /// Per-message decode errors are skipped by the pipeline; everything else halts it.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ItchError::UnknownMessageType(_)
                | ItchError::MalformedMessage { .. }
                | ItchError::InvalidField { .. }
                | ItchError::TruncatedField { .. }
        )
    }

    /// True for errors that end processing of the current file.
    pub fn is_fatal(&self) -> bool {
        !self.is_decode_error()
    }
}

impl From<std::io::Error> for ItchError {
    fn from(err: std::io::Error) -> Self {
        ItchError::Generic(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for ItchError {
    fn from(err: serde_json::Error) -> Self {
        ItchError::Generic(format!("JSON error: {err}"))
    }
}

impl From<String> for ItchError {
    fn from(err: String) -> Self {
        ItchError::Generic(err)
    }
}

impl From<&str> for ItchError {
    fn from(err: &str) -> Self {
        ItchError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ItchError::UnknownMessageType(b'Z');
        assert_eq!(err.to_string(), "Unknown message type: 0x5a");

        let err = ItchError::MalformedMessage {
            tag: b'A',
            expected_len: 36,
            actual_len: 30,
        };
        assert_eq!(
            err.to_string(),
            "Malformed 'A' message: expected 36 bytes, got 30"
        );

        let err = ItchError::TruncatedStream { offset: 1024 };
        assert_eq!(err.to_string(), "Truncated stream at offset 1024");
    }

    #[test]
    fn test_error_classification() {
        assert!(ItchError::UnknownMessageType(b'Z').is_decode_error());
        assert!(ItchError::InvalidField {
            tag: b'A',
            field: "side",
            value: b'Q'
        }
        .is_decode_error());
        assert!(ItchError::TruncatedStream { offset: 0 }.is_fatal());
        assert!(ItchError::Io {
            offset: 10,
            message: "boom".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_result_type() {
        let result: Result<i32> = Err(ItchError::generic("nope"));
        assert!(result.is_err());
    }
}
