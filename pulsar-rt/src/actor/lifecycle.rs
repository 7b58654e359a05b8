//! Actor lifecycle state machine.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tracing::warn;

// Layer 3: Internal module imports
// (none)

/// Actor state in the lifecycle state machine.
///
/// # State Transitions
///
/// ```text
/// Inception -> Starting -> Running -> Stopping -> Terminated
/// ```
///
/// Transitions are monotonic: no state is ever revisited, `Running` is
/// entered only after a successful handshake, and `Terminated` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActorState {
    /// Created, nothing has run yet.
    Inception,

    /// Connecting the mailbox and performing the handshake.
    Starting,

    /// Handshake acknowledged; processing commands.
    Running,

    /// Graceful shutdown in progress.
    Stopping,

    /// Terminal; the supervisor removes its record.
    Terminated,
}

impl ActorState {
    /// Lowercase label, as reported by the `info` command.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inception => "inception",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
        }
    }
}

impl Default for ActorState {
    fn default() -> Self {
        Self::Inception
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Lifecycle tracker enforcing monotonic transitions.
///
/// # Examples
///
/// ```rust
/// use pulsar_rt::actor::{ActorLifecycle, ActorState};
///
/// let mut lifecycle = ActorLifecycle::new();
/// assert_eq!(lifecycle.state(), ActorState::Inception);
///
/// assert!(lifecycle.transition_to(ActorState::Starting));
/// assert!(lifecycle.transition_to(ActorState::Running));
/// // Going backwards is rejected.
/// assert!(!lifecycle.transition_to(ActorState::Starting));
/// assert_eq!(lifecycle.state(), ActorState::Running);
/// ```
#[derive(Debug, Clone)]
pub struct ActorLifecycle {
    state: ActorState,
    created_at: DateTime<Utc>,
    last_state_change: DateTime<Utc>,
}

impl ActorLifecycle {
    /// Create a tracker in `Inception`.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            state: ActorState::Inception,
            created_at: now,
            last_state_change: now,
        }
    }

    /// Attempt a forward transition; returns whether the state changed.
    ///
    /// Re-entering the current state or moving backwards is refused (and
    /// logged), which collapses concurrent `Stopping` entries into the
    /// first one.
    pub fn transition_to(&mut self, next: ActorState) -> bool {
        if next > self.state {
            self.state = next;
            self.last_state_change = Utc::now();
            true
        } else {
            if next < self.state {
                warn!(
                    from = %self.state,
                    to = %next,
                    "refusing backwards lifecycle transition"
                );
            }
            false
        }
    }

    /// Current state.
    pub fn state(&self) -> ActorState {
        self.state
    }

    /// When the actor record was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the last state change.
    pub fn last_state_change(&self) -> DateTime<Utc> {
        self.last_state_change
    }

    /// Seconds since creation.
    pub fn uptime_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.created_at)
            .num_seconds()
    }

    /// True once the actor reached `Terminated`.
    pub fn is_terminated(&self) -> bool {
        self.state == ActorState::Terminated
    }

    /// True while shutdown is in progress or done.
    pub fn is_stopping(&self) -> bool {
        self.state >= ActorState::Stopping
    }
}

impl Default for ActorLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
