//! Generic connection lifecycle: producers, protocols, consumers.
//!
//! Every TCP endpoint in the runtime, the arbiter's mailbox server and any
//! user socket server an actor registers alike, is wired the same way: a
//! [`ProtocolProducer`] creates one [`Protocol`] per accepted connection,
//! and the protocol feeds inbound bytes through a chain of
//! [`ProtocolConsumer`]s, one request/response exchange each.

pub mod consumer;
pub mod error;
pub mod producer;
#[allow(clippy::module_inception)]
pub mod protocol;
pub mod server;
pub mod time;

pub use consumer::{consumer_events, ProtocolConsumer};
pub use error::ProtocolError;
pub use producer::{ConnectionHook, ConsumerFactory, ProducerCounters, ProtocolProducer};
pub use protocol::{Protocol, CONNECTION_LOST, CONNECTION_MADE};
pub use server::{Server, Transport};
pub use time::TimeTracker;
