//! Arbiter error types.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::actor::ActorError;
use crate::mailbox::MailboxError;
use crate::util::ActorId;

/// Errors surfaced by the arbiter and its handle.
#[derive(Error, Debug)]
pub enum ArbiterError {
    /// No route for the addressed actor
    #[error("unknown target actor: {0}")]
    UnknownTarget(ActorId),

    /// No actor or monitor under that name
    #[error("unknown name: {0}")]
    UnknownName(String),

    /// The arbiter loop is not running (never started, or torn down)
    #[error("arbiter is not running")]
    NotRunning,

    /// A second arbiter was initialised in this process
    #[error("an arbiter is already running in this process")]
    AlreadyRunning,

    /// The process-wide arbiter terminated and cannot be restarted
    #[error("the arbiter has terminated")]
    Terminated,

    /// Spawning a child failed
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    /// A spawned child never completed its handshake
    #[error("handshake timeout for {0}")]
    HandshakeTimeout(ActorId),

    /// Mailbox-level failure on one of the arbiter's connections
    #[error("mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    /// An actor-layer failure during spawn
    #[error(transparent)]
    Actor(#[from] ActorError),

    /// The remote handler answered with an error reply
    #[error("remote error: {0}")]
    Remote(String),

    /// The runtime configuration did not validate
    #[error("configuration error: {0}")]
    Config(String),

    /// The mailbox server could not be set up
    #[error("io error: {0}")]
    Io(String),
}

impl ArbiterError {
    /// True for errors that map to exit code 2 (configuration).
    pub fn is_config(&self) -> bool {
        match self {
            Self::Actor(error) => error.is_config(),
            Self::AlreadyRunning | Self::Config(_) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ArbiterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_classification() {
        assert!(ArbiterError::AlreadyRunning.is_config());
        assert!(ArbiterError::Actor(ActorError::UnknownKind("x".to_owned())).is_config());
        assert!(!ArbiterError::NotRunning.is_config());
        assert!(!ArbiterError::Remote("boom".to_owned()).is_config());
    }

    #[test]
    fn test_display() {
        let aid = ActorId::new();
        assert!(ArbiterError::UnknownTarget(aid)
            .to_string()
            .contains(&aid.to_string()));
        assert_eq!(
            ArbiterError::NotRunning.to_string(),
            "arbiter is not running"
        );
    }
}
