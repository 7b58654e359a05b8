//! One request/response exchange on a connection.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::error::ProtocolError;
use crate::events::EventHub;

/// Name of the abortable many-time event fired when an exchange starts.
pub const PRE_REQUEST: &str = "pre_request";

/// Name of the one-time event fired when an exchange completes.
pub const POST_REQUEST: &str = "post_request";

/// Name of the many-time event fired after each chunk of inbound bytes.
pub const DATA_PROCESSED: &str = "data_processed";

/// Build the event hub a consumer carries: `post_request` declared
/// one-time, the others created lazily as many-time events.
pub fn consumer_events() -> EventHub {
    let events = EventHub::new();
    events.declare_once(POST_REQUEST);
    events
}

/// A protocol consumer processes exactly one request/response exchange.
///
/// The owning [`Protocol`](super::Protocol) drives the lifecycle: it fires
/// `pre_request` (handlers may abort the exchange), calls
/// [`start_request`](Self::start_request), then feeds inbound bytes until
/// the consumer reports itself finished; whatever bytes belong to the next
/// exchange come back as the unprocessed tail.
pub trait ProtocolConsumer: Send + 'static {
    /// The event hub of this exchange (see [`consumer_events`]).
    fn events(&self) -> &EventHub;

    /// Hook invoked once when the exchange starts.
    fn start_request(&mut self) {}

    /// Consume inbound bytes; return the unprocessed tail.
    fn feed_data(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError>;

    /// True once the exchange is complete and the consumer can be
    /// released from the protocol.
    fn finished(&self) -> bool;
}
