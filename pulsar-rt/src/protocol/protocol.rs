//! The per-connection protocol state machine.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::consumer::{ProtocolConsumer, DATA_PROCESSED, POST_REQUEST, PRE_REQUEST};
use super::error::ProtocolError;
use super::producer::{ConsumerFactory, ProducerCounters};
use super::server::Transport;
use super::time::TimeTracker;
use crate::events::{EventError, EventHub};
use crate::message::Value;

/// One-time event fired when the transport is established.
pub const CONNECTION_MADE: &str = "connection_made";

/// One-time event fired when the transport goes away.
pub const CONNECTION_LOST: &str = "connection_lost";

struct ConsumerState {
    consumer: Box<dyn ProtocolConsumer>,
    started: bool,
}

/// A protocol bound to one transport, feeding a chain of consumers.
///
/// The protocol owns the connection-level events (`connection_made`,
/// `connection_lost`, both one-time) and tracks the last-change stamp the
/// idle sweep reads. Inbound bytes are handed to the current consumer,
/// allocated on demand from the consumer factory, one exchange at a time.
pub struct Protocol {
    session: usize,
    transport: Transport,
    events: EventHub,
    factory: ConsumerFactory,
    pending_factory: Option<ConsumerFactory>,
    current: Option<ConsumerState>,
    counters: Arc<ProducerCounters>,
    time: TimeTracker,
    last_change: u64,
}

impl Protocol {
    pub(crate) fn new(
        session: usize,
        transport: Transport,
        factory: ConsumerFactory,
        counters: Arc<ProducerCounters>,
        time: TimeTracker,
    ) -> Self {
        let events = EventHub::new();
        events.declare_once(CONNECTION_MADE);
        events.declare_once(CONNECTION_LOST);
        let last_change = time.current_time();
        Self {
            session,
            transport,
            events,
            factory,
            pending_factory: None,
            current: None,
            counters,
            time,
            last_change,
        }
    }

    /// This protocol's session number within its producer.
    pub fn session(&self) -> usize {
        self.session
    }

    /// Connection-level events.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// The write side of the connection.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Seconds since the last inbound activity, by the coarse clock.
    pub fn idle_seconds(&self) -> u64 {
        self.time.current_time().saturating_sub(self.last_change)
    }

    /// Record that the transport is up; fires `connection_made`.
    pub fn connection_made(&mut self) {
        self.last_change = self.time.current_time();
        debug!(
            session = self.session,
            peer = %self.transport.peer(),
            "connection made"
        );
        self.events.fire(
            CONNECTION_MADE,
            Some(Value::from(self.transport.peer().to_string())),
            None,
        );
    }

    /// Feed inbound bytes through the consumer chain.
    ///
    /// Loops until the whole chunk is consumed: allocates a consumer on
    /// demand, starts it on its first bytes, and releases it once it
    /// reports the exchange finished, handing any unprocessed tail to the
    /// next consumer.
    pub fn data_received(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.last_change = self.time.current_time();
        let mut chunk = data.to_vec();
        loop {
            self.ensure_consumer();
            self.start_current();

            let state = match self.current.as_mut() {
                Some(state) => state,
                None => return Ok(()),
            };
            let tail = state.consumer.feed_data(&chunk)?;
            let processed = chunk.len() - tail.len();
            state.consumer.events().fire(
                DATA_PROCESSED,
                Some(Value::Int(processed as i64)),
                None,
            );

            let finished = state.consumer.finished();
            if finished {
                state.consumer.events().fire(POST_REQUEST, None, None);
                self.finish_current();
            }

            if tail.is_empty() {
                return Ok(());
            }
            if processed == 0 && !finished {
                // A consumer that neither consumes nor finishes would
                // spin; treat the leftover as pipelined input for later.
                warn!(session = self.session, "consumer made no progress");
                return Ok(());
            }
            chunk = tail;
        }
    }

    /// Tear down: fires `connection_lost`, and completes a pending
    /// exchange's `post_request` with the error.
    pub fn connection_lost(&mut self, exc: Option<EventError>) {
        debug!(session = self.session, "connection lost");
        if let Some(state) = self.current.take() {
            if !state.consumer.events().has_fired(POST_REQUEST) {
                state
                    .consumer
                    .events()
                    .fire(POST_REQUEST, None, exc.clone());
            }
        }
        self.events.fire(CONNECTION_LOST, None, exc);
    }

    /// Swap the consumer factory.
    ///
    /// With no active exchange the new factory takes effect immediately
    /// (a consumer is created now); otherwise it replaces the old factory
    /// when the current exchange finishes.
    pub fn upgrade(&mut self, new_factory: ConsumerFactory) {
        if self.current.is_none() {
            self.factory = new_factory;
            self.ensure_consumer();
        } else {
            self.pending_factory = Some(new_factory);
        }
    }

    /// Drop the current consumer if `finished` reports the exchange done.
    pub fn finished_consumer(&mut self) {
        let done = self
            .current
            .as_ref()
            .map(|state| state.consumer.finished())
            .unwrap_or(false);
        if done {
            self.finish_current();
        }
    }

    /// Events of the active consumer, if one exists.
    pub fn current_consumer_events(&mut self) -> Option<EventHub> {
        self.ensure_consumer();
        self.current
            .as_ref()
            .map(|state| state.consumer.events().clone())
    }

    fn ensure_consumer(&mut self) {
        if self.current.is_none() {
            let consumer = (self.factory)(self.transport.clone());
            self.current = Some(ConsumerState {
                consumer,
                started: false,
            });
        }
    }

    fn start_current(&mut self) {
        let state = match self.current.as_mut() {
            Some(state) if !state.started => state,
            _ => return,
        };
        state.started = true;
        self.counters.record_request();
        match state.consumer.events().fire_abortable(PRE_REQUEST, None) {
            Ok(()) => state.consumer.start_request(),
            Err(error) => {
                // Aborted by a pre_request handler: the exchange still
                // reads its input, it just skips the subclass hook.
                debug!(session = self.session, %error, "exchange start skipped");
            }
        }
    }

    fn finish_current(&mut self) {
        self.current = None;
        if let Some(factory) = self.pending_factory.take() {
            self.factory = factory;
        }
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("session", &self.session)
            .field("peer", &self.transport.peer())
            .field("active_exchange", &self.current.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consumer::consumer_events;
    use crate::protocol::producer::ProtocolProducer;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Consumes input up to each newline; one line is one exchange.
    struct LineConsumer {
        events: EventHub,
        lines: Arc<Mutex<Vec<String>>>,
        buffer: Vec<u8>,
        done: bool,
    }

    impl LineConsumer {
        fn new(events: EventHub, lines: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                events,
                lines,
                buffer: Vec::new(),
                done: false,
            }
        }
    }

    impl ProtocolConsumer for LineConsumer {
        fn events(&self) -> &EventHub {
            &self.events
        }

        fn feed_data(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
            match data.iter().position(|&b| b == b'\n') {
                Some(at) => {
                    self.buffer.extend_from_slice(&data[..at]);
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.lines.lock().push(line);
                    self.done = true;
                    Ok(data[at + 1..].to_vec())
                }
                None => {
                    self.buffer.extend_from_slice(data);
                    Ok(Vec::new())
                }
            }
        }

        fn finished(&self) -> bool {
            self.done
        }
    }

    fn line_producer(time: TimeTracker) -> (ProtocolProducer, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let producer = ProtocolProducer::new(
            time,
            Arc::new(move |_transport| {
                Box::new(LineConsumer::new(consumer_events(), Arc::clone(&sink)))
                    as Box<dyn ProtocolConsumer>
            }),
        );
        (producer, lines)
    }

    fn test_protocol() -> (Protocol, Arc<Mutex<Vec<String>>>, ProtocolProducer) {
        let time = TimeTracker::start();
        let (producer, lines) = line_producer(time);
        let (transport, _rx) = Transport::pipe("127.0.0.1:9999".parse().unwrap());
        let protocol = producer.create_protocol(transport);
        (protocol, lines, producer)
    }

    #[tokio::test]
    async fn test_single_exchange() {
        let (mut protocol, lines, producer) = test_protocol();
        protocol.connection_made();

        protocol.data_received(b"hello\n").unwrap();

        assert_eq!(*lines.lock(), vec!["hello".to_owned()]);
        assert_eq!(producer.requests_processed(), 1);
    }

    #[tokio::test]
    async fn test_pipelined_exchanges_share_a_chunk() {
        let (mut protocol, lines, producer) = test_protocol();
        protocol.connection_made();

        protocol.data_received(b"one\ntwo\nthree\n").unwrap();

        assert_eq!(
            *lines.lock(),
            vec!["one".to_owned(), "two".to_owned(), "three".to_owned()]
        );
        assert_eq!(producer.requests_processed(), 3);
    }

    #[tokio::test]
    async fn test_split_input_is_buffered_by_consumer() {
        let (mut protocol, lines, _producer) = test_protocol();
        protocol.connection_made();

        protocol.data_received(b"whole ").unwrap();
        protocol.data_received(b"line\n").unwrap();

        assert_eq!(*lines.lock(), vec!["whole line".to_owned()]);
    }

    #[tokio::test]
    async fn test_connection_made_event_fires_once() {
        let (mut protocol, _lines, _producer) = test_protocol();
        let made = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&made);
        protocol
            .events()
            .bind(CONNECTION_MADE, move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        protocol.connection_made();

        assert_eq!(made.load(Ordering::SeqCst), 1);
        assert!(protocol.events().has_fired(CONNECTION_MADE));
    }

    #[tokio::test]
    async fn test_connection_lost_completes_pending_exchange() {
        let (mut protocol, _lines, _producer) = test_protocol();
        protocol.connection_made();

        // Start an exchange but never finish it.
        protocol.data_received(b"partial").unwrap();
        let consumer_events = protocol.current_consumer_events().unwrap();
        assert!(!consumer_events.has_fired(POST_REQUEST));

        protocol.connection_lost(Some(EventError::ConnectionLost));

        assert!(consumer_events.has_fired(POST_REQUEST));
        assert!(protocol.events().has_fired(CONNECTION_LOST));
    }

    #[tokio::test]
    async fn test_post_request_fires_on_completion() {
        let (mut protocol, _lines, _producer) = test_protocol();
        protocol.connection_made();

        let events = protocol.current_consumer_events().unwrap();
        protocol.data_received(b"line\n").unwrap();

        assert!(events.has_fired(POST_REQUEST));
    }

    #[tokio::test]
    async fn test_upgrade_without_active_consumer_is_immediate() {
        let time = TimeTracker::start();
        let (producer, _lines) = line_producer(time);
        let (transport, _rx) = Transport::pipe("127.0.0.1:9999".parse().unwrap());
        let mut protocol = producer.create_protocol(transport);
        protocol.connection_made();

        let upgraded = Arc::new(AtomicUsize::new(0));
        let mark = Arc::clone(&upgraded);
        protocol.upgrade(Arc::new(move |_transport| {
            mark.fetch_add(1, Ordering::SeqCst);
            Box::new(LineConsumer::new(
                consumer_events(),
                Arc::new(Mutex::new(Vec::new())),
            )) as Box<dyn ProtocolConsumer>
        }));

        assert_eq!(upgraded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upgrade_with_active_consumer_waits_for_finish() {
        let (mut protocol, lines, _producer) = test_protocol();
        protocol.connection_made();
        protocol.data_received(b"in flight").unwrap();

        let upgraded = Arc::new(AtomicUsize::new(0));
        let mark = Arc::clone(&upgraded);
        protocol.upgrade(Arc::new(move |_transport| {
            mark.fetch_add(1, Ordering::SeqCst);
            Box::new(LineConsumer::new(
                consumer_events(),
                Arc::new(Mutex::new(Vec::new())),
            )) as Box<dyn ProtocolConsumer>
        }));
        assert_eq!(upgraded.load(Ordering::SeqCst), 0);

        // Finish the in-flight exchange; next allocation uses the new
        // factory, whose lines go to a different sink.
        protocol.data_received(b" done\nnext line\n").unwrap();

        assert_eq!(upgraded.load(Ordering::SeqCst), 1);
        assert_eq!(*lines.lock(), vec!["in flight done".to_owned()]);
    }

    #[tokio::test]
    async fn test_pre_request_abort_skips_start_hook() {
        struct HookConsumer {
            events: EventHub,
            started: Arc<AtomicUsize>,
        }
        impl ProtocolConsumer for HookConsumer {
            fn events(&self) -> &EventHub {
                &self.events
            }
            fn start_request(&mut self) {
                self.started.fetch_add(1, Ordering::SeqCst);
            }
            fn feed_data(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
                let _ = data;
                Ok(Vec::new())
            }
            fn finished(&self) -> bool {
                false
            }
        }

        let started = Arc::new(AtomicUsize::new(0));
        let hook_started = Arc::clone(&started);
        let time = TimeTracker::start();
        let producer = ProtocolProducer::new(
            time,
            Arc::new(move |_transport| {
                let events = consumer_events();
                events
                    .bind(PRE_REQUEST, |_, _| {
                        Err(EventError::Aborted(PRE_REQUEST.to_owned()))
                    })
                    .unwrap();
                Box::new(HookConsumer {
                    events,
                    started: Arc::clone(&hook_started),
                }) as Box<dyn ProtocolConsumer>
            }),
        );
        let (transport, _rx) = Transport::pipe("127.0.0.1:9999".parse().unwrap());
        let mut protocol = producer.create_protocol(transport);
        protocol.connection_made();

        protocol.data_received(b"ignored").unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(producer.requests_processed(), 1);
    }
}
