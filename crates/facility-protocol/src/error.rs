//! Wire error types.

use facility_core::TimeError;
use thiserror::Error;

/// Result type for encode/decode operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding datagrams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A read needed more bytes than the datagram has left.
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    /// A string field did not hold valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A string is longer than its `u16` length prefix can express.
    #[error("string too long: {len} bytes (max: {max})")]
    StringTooLong { len: usize, max: usize },

    /// A request body is longer than its `u16` length prefix can express.
    #[error("body too long: {len} bytes (max: {max})")]
    BodyTooLong { len: usize, max: usize },

    /// A counted list has more entries than its `u16` count can express.
    #[error("too many {what}: {count} (max: {max})")]
    TooManyItems {
        what: &'static str,
        count: usize,
        max: usize,
    },

    /// A request declared more body bytes than the datagram carries.
    #[error("declared body length {declared} but {actual} bytes follow the header")]
    BodyLengthMismatch { declared: usize, actual: usize },

    /// Unrecognised request message type byte.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Unrecognised response status byte.
    #[error("unknown status code: {0}")]
    UnknownStatus(u8),

    /// Unrecognised monitor operation byte.
    #[error("unknown monitor operation: {0}")]
    UnknownOperation(u8),

    /// Decoded start/end pair violates `start < end`.
    #[error(transparent)]
    InvalidTimeSlot(#[from] TimeError),
}

impl WireError {
    pub(crate) fn underflow(needed: usize, remaining: usize) -> Self {
        Self::BufferUnderflow { needed, remaining }
    }

    /// Returns true if the datagram was simply too short.
    pub fn is_underflow(&self) -> bool {
        matches!(self, Self::BufferUnderflow { .. })
    }
}
