//! Wire-level error types.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors produced while encoding or decoding wire data.
///
/// Any `CodecError` surfaced by a live connection is a protocol violation:
/// the endpoint that observes it closes the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a value
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Unknown value type tag
    #[error("unknown value tag: 0x{0:02x}")]
    UnknownTag(u8),

    /// String payload was not valid UTF-8
    #[error("invalid utf-8 in string value")]
    InvalidUtf8,

    /// Nested containers exceeded the decode depth limit
    #[error("value nesting exceeds depth limit of {0}")]
    DepthExceeded(usize),

    /// Declared container or payload length is implausible
    #[error("declared length {len} exceeds limit {max}")]
    LengthExceeded { len: usize, max: usize },

    /// Frame header byte was not an unmasked final data frame
    #[error("invalid frame header: 0x{0:02x}")]
    InvalidHeader(u8),

    /// Frame carried a mask bit; mailbox frames are always unmasked
    #[error("masked frame rejected")]
    MaskedFrame,

    /// Frame payload exceeds the configured maximum
    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Message payload tag was neither request nor reply
    #[error("unknown message tag: 0x{0:02x}")]
    UnknownMessageTag(u8),

    /// Envelope is missing a required field
    #[error("message missing field '{0}'")]
    MissingField(&'static str),

    /// Envelope field has the wrong value type
    #[error("message field '{field}' expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// Request id does not fit in 32 bits
    #[error("request id {0} out of range")]
    IdOutOfRange(i64),

    /// Actor id field was not a valid identity token
    #[error("invalid actor id in field '{0}'")]
    InvalidActorId(&'static str),

    /// Bytes were left over after a complete message was decoded
    #[error("trailing bytes after message")]
    TrailingBytes,

    /// Transport-level failure surfaced through the codec
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            CodecError::UnknownTag(0x7f).to_string(),
            "unknown value tag: 0x7f"
        );
        assert!(CodecError::FrameTooLarge { len: 10, max: 5 }
            .to_string()
            .contains("10"));
        assert!(CodecError::MissingField("id").to_string().contains("id"));
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(CodecError::UnexpectedEof, CodecError::UnexpectedEof);
        assert_ne!(
            CodecError::UnknownTag(1),
            CodecError::UnknownTag(2)
        );
    }
}
