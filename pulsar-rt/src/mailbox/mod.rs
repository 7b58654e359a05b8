//! The mailbox: framed RPC between each actor and the arbiter.
//!
//! Every actor holds exactly one persistent TCP connection to the
//! arbiter's mailbox server; there are no peer-to-peer connections. The
//! client side lives here ([`MailboxClient`]); the server side plugs the
//! mailbox wire protocol into the generic [`protocol`](crate::protocol)
//! pipeline and surfaces per-connection events for the arbiter to route.

pub mod client;
pub mod error;
pub mod pending;
pub mod server;
pub mod state;

pub use client::{InboundRequest, MailboxClient};
pub use error::MailboxError;
pub use pending::PendingRequests;
pub use server::{mailbox_producer, ConnectionEvent};
pub use state::MailboxState;
