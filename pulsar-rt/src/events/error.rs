//! Event surface error types.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors surfaced by the event hub and delivered through one-time events.
///
/// `Failed`, `Aborted`, and `ConnectionLost` travel as event payloads (the
/// explicit result variants replacing exception-as-flow control); the
/// remaining variants are hub usage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Binding or firing a one-time event that already fired
    #[error("one-time event '{0}' has already fired")]
    AlreadyFired(String),

    /// Waiting on a one-time event that was never declared
    #[error("'{0}' is not a declared one-time event")]
    NotOneTime(String),

    /// A handler asked to abort the operation guarded by the event
    #[error("aborted by '{0}' handler")]
    Aborted(String),

    /// The failure a one-time event was fired with
    #[error("{0}")]
    Failed(String),

    /// The connection backing the emitter went away before the event fired
    #[error("connection lost")]
    ConnectionLost,

    /// The emitter was dropped before the event fired
    #[error("event '{0}' dropped before firing")]
    Dropped(String),
}
