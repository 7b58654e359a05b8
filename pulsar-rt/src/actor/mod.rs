//! Actors: isolated execution units with their own event loop.
//!
//! Each actor runs on a dedicated single-threaded runtime, either in its
//! own OS process (default) or its own thread, holds exactly one mailbox
//! connection to the arbiter, and processes inbound commands strictly in
//! arrival order. The only way in or out is a message.

pub mod context;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod runner;
pub mod spawn;
pub mod traits;

pub use context::ActorContext;
pub use error::ActorError;
pub use factory::{create_actor, register_actor, ActorFactory};
pub use lifecycle::{ActorLifecycle, ActorState};
pub use runner::{run_actor, run_actor_blocking};
pub use spawn::{
    maybe_run_worker, spawn_child, ConcurrencyMode, SpawnParams, SpawnedChild, WORKER_ARG,
};
pub use traits::{Actor, NullActor};
