//! Command registry: the verbs actors exchange.
//!
//! The registry is process-global and populated with the built-in verbs on
//! first access. New verbs may be registered at any time; an entry, once
//! registered, is never replaced.

pub mod builtin;
pub mod error;
pub mod registry;
pub mod request;

pub use error::CommandError;
pub use registry::{global, register, register_callable, CommandRegistry, CommandSpec};
pub use request::{CommandRequest, CommandTarget};

/// Built-in verb: reply `"pong"`.
pub const PING: &str = "ping";
/// Built-in verb: reply with the first argument unchanged.
pub const ECHO: &str = "echo";
/// Built-in verb: reply with the target actor's info snapshot.
pub const INFO: &str = "info";
/// Built-in verb: periodic heartbeat; the first one is the handshake.
pub const NOTIFY: &str = "notify";
/// Built-in verb: execute a registered callable on the target's loop.
pub const RUN: &str = "run";
/// Built-in verb: begin graceful shutdown of the target.
pub const STOP: &str = "stop";
/// Built-in verb (arbiter only): spawn a new actor.
pub const SPAWN: &str = "spawn";
