//! The process-wide arbiter handle.
//!
//! The arbiter is a singleton per process: one init, one teardown, no
//! restart. The [`Arbiter`](super::Arbiter) struct itself carries no
//! global state (tests run several in one process); this cell enforces
//! the singleton contract for the loader path only.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::error::ArbiterError;
use super::handle::ArbiterHandle;

enum GlobalState {
    Unset,
    Running(ArbiterHandle),
    Terminated,
}

static GLOBAL: Mutex<GlobalState> = Mutex::new(GlobalState::Unset);

/// Install the process-wide arbiter handle.
///
/// Fails on double init, and once an arbiter has terminated the process
/// cannot host another.
pub fn init_arbiter(handle: ArbiterHandle) -> Result<(), ArbiterError> {
    let mut state = GLOBAL.lock();
    match *state {
        GlobalState::Unset => {
            *state = GlobalState::Running(handle);
            Ok(())
        }
        GlobalState::Running(_) => Err(ArbiterError::AlreadyRunning),
        GlobalState::Terminated => Err(ArbiterError::Terminated),
    }
}

/// The process-wide arbiter handle.
pub fn get_arbiter() -> Result<ArbiterHandle, ArbiterError> {
    match &*GLOBAL.lock() {
        GlobalState::Unset => Err(ArbiterError::NotRunning),
        GlobalState::Running(handle) => Ok(handle.clone()),
        GlobalState::Terminated => Err(ArbiterError::Terminated),
    }
}

/// Mark the process-wide arbiter as terminated.
pub fn teardown_arbiter() {
    let mut state = GLOBAL.lock();
    if matches!(*state, GlobalState::Running(_)) {
        *state = GlobalState::Terminated;
    }
}
