//! # pulsar-rt - Event-Driven Actor Runtime
//!
//! A supervised population of isolated execution units, processes or
//! threads, each with its own single-threaded event loop, communicating
//! exclusively by asynchronous messages over persistent TCP mailboxes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pulsar_rt::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() {
//!     // Spawned worker processes re-enter here; hand them off first.
//!     if let Some(code) = pulsar_rt::actor::maybe_run_worker() {
//!         std::process::exit(code);
//!     }
//!
//!     // Register the worker kinds this binary can host.
//!     register_actor("worker", Arc::new(|| Box::new(NullActor))).unwrap();
//!
//!     // Run the arbiter until SIGTERM/SIGINT.
//!     let config = RuntimeConfig::default();
//!     pulsar_rt::arbiter::run(config).exit();
//! }
//! ```
//!
//! Driving the runtime from async code instead:
//!
//! ```rust,ignore
//! let (arbiter, handle) = Arbiter::bind(RuntimeConfig::default()).await?;
//! tokio::spawn(arbiter.serve());
//!
//! let aid = handle.spawn(SpawnRequest::new("worker")).await?;
//! let pong = handle.send(aid, "ping", vec![], Default::default()).await?;
//! handle.stop().await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//!                    Arbiter (root supervisor, mailbox server)
//!                   /    |    \
//!            Monitor   Monitor  direct children
//!            /  |  \      |
//!          workers ...  workers        (processes or threads)
//! ```
//!
//! Every actor holds exactly one TCP connection to the arbiter's mailbox
//! server; there are no peer-to-peer sockets. When actor A sends to
//! actor B, the arbiter reads the framed request off A's connection,
//! rewrites the hop-level correlation id, and forwards it on B's
//! connection; replies traverse the same path in reverse.
//!
//! # Module Organization
//!
//! ## Core
//! - [`actor`] - Actor behaviour trait, lifecycle, context, spawn modes
//! - [`command`] - Registered verbs (ping, echo, info, notify, run, stop, spawn)
//! - [`mailbox`] - Framed request/reply RPC between actors and the arbiter
//! - [`message`] - Wire model: values, frames, envelopes
//!
//! ## Supervision
//! - [`arbiter`] - Root supervisor: routing, directory, signals, shutdown
//! - [`supervisor`] - Proxy records, monitor pools, restart backoff
//!
//! ## Infrastructure
//! - [`events`] - Named one-time and many-time events with bound handlers
//! - [`protocol`] - Producer/Protocol/Consumer pipeline for any TCP endpoint
//! - [`system`] - Runtime configuration, loader options, exit codes
//! - [`util`] - Identifiers and serde helpers

pub mod actor;
pub mod arbiter;
pub mod command;
pub mod events;
pub mod mailbox;
pub mod message;
pub mod prelude;
pub mod protocol;
pub mod supervisor;
pub mod system;
pub mod util;

// Re-export commonly used types
pub use actor::{
    maybe_run_worker, register_actor, Actor, ActorContext, ActorError, ActorLifecycle, ActorState,
    ConcurrencyMode,
};
pub use arbiter::{get_arbiter, Arbiter, ArbiterError, ArbiterHandle, Shutdown, SpawnRequest};
pub use command::{register, register_callable, CommandError, CommandRequest, CommandTarget};
pub use events::{EventError, EventHub, HandlerId};
pub use mailbox::{MailboxClient, MailboxError, MailboxState, PendingRequests};
pub use message::{CodecError, FrameCodec, MailboxMessage, MessageCodec, Reply, Request, Value};
pub use protocol::{
    Protocol, ProtocolConsumer, ProtocolError, ProtocolProducer, Server, TimeTracker, Transport,
};
pub use supervisor::{ActorProxy, MonitorPool, RestartBackoff};
pub use system::{ExitCode, RuntimeConfig, RuntimeOptions};
pub use util::ActorId;
