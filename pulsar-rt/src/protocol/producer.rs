//! Protocol factories.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::consumer::ProtocolConsumer;
use super::protocol::Protocol;
use super::server::Transport;
use super::time::TimeTracker;

/// Builds a fresh consumer for the next exchange on a connection.
pub type ConsumerFactory = Arc<dyn Fn(Transport) -> Box<dyn ProtocolConsumer> + Send + Sync>;

/// Invoked on every protocol the producer creates, before any I/O.
///
/// The owner of a server binds its connection-level event handlers here.
pub type ConnectionHook = Arc<dyn Fn(&mut Protocol) + Send + Sync>;

/// Monotonic counters shared by a producer and all its protocols.
#[derive(Debug, Default)]
pub struct ProducerCounters {
    sessions: AtomicUsize,
    requests_processed: AtomicUsize,
}

impl ProducerCounters {
    /// Allocate the next session number (1-based).
    pub fn next_session(&self) -> usize {
        self.sessions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of protocols created so far.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Record one started exchange.
    pub fn record_request(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of exchanges started across all protocols.
    pub fn requests_processed(&self) -> usize {
        self.requests_processed.load(Ordering::Relaxed)
    }
}

/// Creates [`Protocol`] instances for accepted or initiated connections.
///
/// A producer numbers its protocols (`sessions`), counts the exchanges
/// they start (`requests_processed`), and may carry a keep-alive timeout
/// after which idle connections are closed.
#[derive(Clone)]
pub struct ProtocolProducer {
    factory: ConsumerFactory,
    counters: Arc<ProducerCounters>,
    keep_alive: Option<Duration>,
    connection_hook: Option<ConnectionHook>,
    time: TimeTracker,
}

impl ProtocolProducer {
    /// Create a producer from a consumer factory.
    pub fn new(time: TimeTracker, factory: ConsumerFactory) -> Self {
        Self {
            factory,
            counters: Arc::new(ProducerCounters::default()),
            keep_alive: None,
            connection_hook: None,
            time,
        }
    }

    /// Run `hook` on every protocol this producer creates.
    pub fn with_connection_hook(mut self, hook: ConnectionHook) -> Self {
        self.connection_hook = Some(hook);
        self
    }

    /// Close connections idle for longer than `timeout`.
    pub fn with_keep_alive(mut self, timeout: Duration) -> Self {
        self.keep_alive = Some(timeout);
        self
    }

    /// The configured keep-alive timeout, if any.
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }

    /// Number of protocols this producer has created.
    pub fn sessions(&self) -> usize {
        self.counters.sessions()
    }

    /// Number of exchanges started across this producer's protocols.
    pub fn requests_processed(&self) -> usize {
        self.counters.requests_processed()
    }

    /// The shared counters.
    pub fn counters(&self) -> Arc<ProducerCounters> {
        Arc::clone(&self.counters)
    }

    /// Build the next protocol for a connection.
    pub fn create_protocol(&self, transport: Transport) -> Protocol {
        let mut protocol = Protocol::new(
            self.counters.next_session(),
            transport,
            Arc::clone(&self.factory),
            Arc::clone(&self.counters),
            self.time.clone(),
        );
        if let Some(hook) = &self.connection_hook {
            hook(&mut protocol);
        }
        protocol
    }
}

impl std::fmt::Debug for ProtocolProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolProducer")
            .field("sessions", &self.sessions())
            .field("requests_processed", &self.requests_processed())
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}
