//! Actor-level error types.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::command::CommandError;
use crate::mailbox::MailboxError;

/// Errors an actor can die of, or refuse to start with.
#[derive(Error, Debug)]
pub enum ActorError {
    /// Mailbox transport failure; the actor stops
    #[error("mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    /// A command-layer failure escalated out of dispatch
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The user start hook failed
    #[error("start hook failed: {0}")]
    StartFailed(String),

    /// An actor kind was registered twice
    #[error("actor kind already registered: {0}")]
    AlreadyRegistered(String),

    /// Spawn referenced an unregistered actor kind
    #[error("unknown actor kind: {0}")]
    UnknownKind(String),

    /// Spawn parameters did not validate
    #[error("invalid spawn parameters: {0}")]
    InvalidSpawnParams(String),

    /// OS-level failure while spawning or running
    #[error("io error: {0}")]
    Io(String),
}

impl ActorError {
    /// True when the failure is a configuration problem (exit code 2
    /// territory) rather than a runtime one.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnknownKind(_) | Self::InvalidSpawnParams(_) | Self::AlreadyRegistered(_)
        )
    }
}

impl From<std::io::Error> for ActorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
