//! Protocol pipeline error types.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::message::CodecError;

/// Errors raised while driving a connection through its protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The peer sent bytes the codec rejects; the connection closes
    #[error("wire error: {0}")]
    Codec(#[from] CodecError),

    /// A `pre_request` handler aborted the exchange
    #[error("exchange aborted")]
    Aborted,

    /// The transport write side is gone
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-level I/O failure
    #[error("transport error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// True when the error means the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Aborted)
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
