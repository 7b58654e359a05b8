//! Command dispatch error types.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors a command handler (or the dispatcher around it) can produce.
///
/// Every variant is delivered to the sender as an error reply; none of
/// them tears the connection down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No such verb in the registry
    #[error("command not found: {0}")]
    NotFound(String),

    /// The verb exists but the arguments do not fit its contract
    #[error("bad arguments for '{command}': {reason}")]
    BadArguments { command: String, reason: String },

    /// The verb may only be handled by the arbiter
    #[error("'{0}' may only run on the arbiter")]
    ArbiterOnly(String),

    /// `run` named a callable that is not registered
    #[error("callable not found: {0}")]
    UnknownCallable(String),

    /// Registering a verb or callable name that already exists
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// The handler itself failed
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Convenience for handlers wrapping arbitrary failures.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self::Failed(error.to_string())
    }

    /// Convenience for arity/shape violations.
    pub fn bad_arguments(command: &str, reason: impl Into<String>) -> Self {
        Self::BadArguments {
            command: command.to_owned(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            CommandError::NotFound("nope".to_owned()).to_string(),
            "command not found: nope"
        );
        assert!(CommandError::bad_arguments("echo", "missing argument")
            .to_string()
            .contains("echo"));
        assert!(CommandError::ArbiterOnly("spawn".to_owned())
            .to_string()
            .contains("spawn"));
    }

    #[test]
    fn test_failed_helper() {
        let err = CommandError::failed("boom");
        assert_eq!(err, CommandError::Failed("boom".to_owned()));
    }
}
