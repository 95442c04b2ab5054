//! Errors raised while encoding or decoding bridge frames

use thiserror::Error;

/// Result alias for frame operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Error type for the bridge wire format
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Unknown frame kind 0x{0:02x}")]
    UnknownKind(u8),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("String field {field} is {len} bytes, limit is {max}")]
    StringTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Trailing {0} bytes after frame body")]
    TrailingBytes(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
