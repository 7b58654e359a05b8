//! The actor's execution context.

// Layer 1: Standard library imports
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

// Layer 3: Internal module imports
use super::lifecycle::{ActorLifecycle, ActorState};
use super::spawn::ConcurrencyMode;
use crate::command::CommandTarget;
use crate::events::EventHub;
use crate::mailbox::MailboxClient;
use crate::message::Value;
use crate::protocol::{Server, TimeTracker};
use crate::util::ActorId;

/// One-time event fired when the actor enters its loop.
pub const START_EVENT: &str = "start";

/// One-time event fired when graceful shutdown begins.
pub const STOP_EVENT: &str = "stop";

/// Everything an actor exposes to its hooks and command handlers.
///
/// The context is shared (`Arc`) between the actor's loop, its command
/// dispatch, and any servers or tasks the actor sets up; all state is
/// interior and thread-safe, but the loop itself stays single-threaded.
pub struct ActorContext {
    aid: ActorId,
    name: String,
    mode: ConcurrencyMode,
    lifecycle: Arc<Mutex<ActorLifecycle>>,
    events: EventHub,
    mailbox: MailboxClient,
    time: TimeTracker,
    servers: Mutex<HashMap<String, Server>>,
    requests_processed: AtomicUsize,
    last_notified: Mutex<Option<DateTime<Utc>>>,
    extra_info: Mutex<BTreeMap<String, Value>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl ActorContext {
    /// Bind a context to an established mailbox connection.
    pub fn new(
        aid: ActorId,
        name: impl Into<String>,
        mode: ConcurrencyMode,
        lifecycle: Arc<Mutex<ActorLifecycle>>,
        mailbox: MailboxClient,
        time: TimeTracker,
    ) -> Self {
        let events = EventHub::new();
        events.declare_once(START_EVENT);
        events.declare_once(STOP_EVENT);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            aid,
            name: name.into(),
            mode,
            lifecycle,
            events,
            mailbox,
            time,
            servers: Mutex::new(HashMap::new()),
            requests_processed: AtomicUsize::new(0),
            last_notified: Mutex::new(None),
            extra_info: Mutex::new(BTreeMap::new()),
            stop_tx,
            stop_rx,
        }
    }

    /// This actor's identity.
    pub fn aid(&self) -> ActorId {
        self.aid
    }

    /// This actor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process- or thread-hosted.
    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActorState {
        self.lifecycle.lock().state()
    }

    /// The actor's event hub (`start` and `stop` are one-time).
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// The mailbox connection to the arbiter.
    pub fn mailbox(&self) -> &MailboxClient {
        &self.mailbox
    }

    /// The loop's coarse clock.
    pub fn time(&self) -> &TimeTracker {
        &self.time
    }

    /// A receiver that flips to `true` when stop is requested.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// True once someone asked this actor to stop.
    pub fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Register a user server under a name; it closes before the mailbox
    /// on shutdown. A second server under the same name replaces (and
    /// returns) the first.
    pub fn add_server(&self, server: Server) -> Option<Server> {
        let name = server.name().to_owned();
        debug!(actor = %self.aid, server = %name, addr = %server.local_addr(), "server registered");
        self.servers.lock().insert(name, server)
    }

    /// Address of a registered server.
    pub fn server_addr(&self, name: &str) -> Option<std::net::SocketAddr> {
        self.servers.lock().get(name).map(Server::local_addr)
    }

    /// Close every registered server, in no particular order.
    pub async fn close_servers(&self) {
        let servers: Vec<Server> = {
            let mut held = self.servers.lock();
            held.drain().map(|(_, server)| server).collect()
        };
        for server in servers {
            server.close().await;
        }
    }

    /// Record one processed inbound command.
    pub fn record_request(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of inbound commands processed so far.
    pub fn requests_processed(&self) -> usize {
        self.requests_processed.load(Ordering::Relaxed)
    }

    /// Timestamp of the last heartbeat sent, if any.
    pub fn last_notified(&self) -> Option<DateTime<Utc>> {
        *self.last_notified.lock()
    }

    /// Record that a heartbeat was just sent.
    pub fn record_notified(&self) {
        *self.last_notified.lock() = Some(Utc::now());
    }

    /// Add (or replace) an entry in the actor's info snapshot.
    pub fn set_info_entry(&self, key: &str, value: Value) {
        self.extra_info.lock().insert(key.to_owned(), value);
    }

    fn info_map(&self) -> BTreeMap<String, Value> {
        let lifecycle = self.lifecycle.lock().clone();
        let mut info = BTreeMap::new();
        info.insert("aid".to_owned(), Value::from(self.aid.to_string()));
        info.insert("name".to_owned(), Value::from(self.name.clone()));
        info.insert("state".to_owned(), Value::from(lifecycle.state().label()));
        info.insert("mode".to_owned(), Value::from(self.mode.to_string()));
        info.insert(
            "uptime".to_owned(),
            Value::Int(lifecycle.uptime_seconds()),
        );
        info.insert(
            "requests_processed".to_owned(),
            Value::Int(self.requests_processed() as i64),
        );
        info.insert("pid".to_owned(), Value::Int(i64::from(std::process::id())));
        match self.last_notified() {
            Some(at) => info.insert(
                "last_notified".to_owned(),
                Value::Float(at.timestamp_millis() as f64 / 1000.0),
            ),
            None => info.insert("last_notified".to_owned(), Value::Null),
        };
        for (key, value) in self.extra_info.lock().iter() {
            info.insert(key.clone(), value.clone());
        }
        info
    }
}

impl CommandTarget for ActorContext {
    fn aid(&self) -> ActorId {
        self.aid
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn info(&self) -> Value {
        Value::Map(self.info_map())
    }

    fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl std::fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorContext")
            .field("aid", &self.aid)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("mode", &self.mode)
            .finish()
    }
}
