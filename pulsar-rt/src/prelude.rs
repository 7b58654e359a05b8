//! Prelude module for convenient imports.
//!
//! Re-exports the types most programs need to define actors, run an
//! arbiter, and exchange commands:
//!
//! ```rust
//! use pulsar_rt::prelude::*;
//! ```

// Core actor surface
pub use crate::actor::{
    maybe_run_worker, register_actor, Actor, ActorContext, ActorError, ActorState, ConcurrencyMode,
};
pub use crate::actor::traits::NullActor;

// Arbiter
pub use crate::arbiter::{Arbiter, ArbiterError, ArbiterHandle, SpawnRequest};

// Commands
pub use crate::command::{register, register_callable, CommandError, CommandRequest};

// Events
pub use crate::events::{EventError, EventHub};

// Wire values
pub use crate::message::Value;

// System
pub use crate::system::{ExitCode, RuntimeConfig, RuntimeOptions};

// Utilities
pub use crate::util::ActorId;
