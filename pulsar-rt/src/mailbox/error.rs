//! Mailbox error types.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::message::CodecError;

/// Errors surfaced by mailbox connections and pending request futures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MailboxError {
    /// The wire carried bytes the codec rejects; the connection closes
    #[error("wire error: {0}")]
    Codec(#[from] CodecError),

    /// The connection dropped; every pending future fails with this
    #[error("connection lost")]
    ConnectionLost,

    /// The connection is not (or no longer) in the ready state
    #[error("mailbox not ready")]
    NotReady,

    /// The peer did not acknowledge the handshake in time
    #[error("handshake not acknowledged within {0:?}")]
    HandshakeTimeout(Duration),

    /// A reply did not arrive within the caller's deadline
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    /// The remote handler answered with an error reply
    #[error("remote error: {0}")]
    Remote(String),

    /// Transport-level I/O failure
    #[error("transport error: {0}")]
    Io(String),
}

impl MailboxError {
    /// True when the owning actor must stop because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost | Self::HandshakeTimeout(_) | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for MailboxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
