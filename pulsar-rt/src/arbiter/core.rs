//! The arbiter's event loop and supervision state.

// Layer 1: Standard library imports
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::codec::Encoder;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::error::ArbiterError;
use super::handle::{ArbiterHandle, ControlMessage, SpawnRequest};
use crate::actor::{spawn_child, ActorState, SpawnParams};
use crate::command::{self, CommandRequest, CommandTarget};
use crate::events::EventHub;
use crate::mailbox::{mailbox_producer, ConnectionEvent, MailboxError};
use crate::message::{MailboxMessage, MessageCodec, Reply, Request, Value};
use crate::protocol::{Server, TimeTracker, Transport};
use crate::supervisor::{ActorProxy, MonitorPool};
use crate::system::RuntimeConfig;
use crate::util::ActorId;

/// One-time event fired when the arbiter's loop starts.
pub const START_EVENT: &str = "start";

/// One-time event fired when graceful shutdown begins.
pub const STOP_EVENT: &str = "stop";

/// Many-time event fired on SIGHUP.
pub const RELOAD_EVENT: &str = "reload";

/// How the arbiter's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// All children stopped within the graceful timeout.
    Graceful,
    /// Remaining children were force-killed after the deadline.
    Forced,
}

enum PendingEntry {
    /// The arbiter's own request; resolve the waiter.
    Local(oneshot::Sender<Result<Value, ArbiterError>>),
    /// The arbiter's own request with nobody waiting (stop fan-out).
    Discard,
    /// A proxied request; route the reply back to its origin.
    Proxied { origin: SocketAddr, origin_id: u32 },
}

struct Connection {
    transport: Transport,
    aid: Option<ActorId>,
    next_id: u32,
    entries: HashMap<u32, PendingEntry>,
}

impl Connection {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            aid: None,
            next_id: 0,
            entries: HashMap::new(),
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

enum SpawnReply {
    /// Resolve a handle waiter with the new aid.
    Handle(oneshot::Sender<Result<ActorId, ArbiterError>>),
    /// Answer a wire `spawn` request.
    Wire { peer: SocketAddr, id: u32 },
    /// A pool worker; the pool's bookkeeping is the only observer.
    Pool,
}

struct PendingSpawn {
    proxy: ActorProxy,
    reply: SpawnReply,
    deadline: DateTime<Utc>,
}

/// The command-target surface of the arbiter itself.
///
/// `notify` and `spawn` never reach this: they touch supervision state
/// and are handled inline on the loop. Everything else (`ping`, `echo`,
/// `info`, `run`, `stop`) goes through the ordinary registry.
struct ArbiterTarget {
    aid: ActorId,
    info: Value,
    stop_flag: Arc<AtomicBool>,
}

impl CommandTarget for ArbiterTarget {
    fn aid(&self) -> ActorId {
        self.aid
    }

    fn name(&self) -> String {
        "arbiter".to_owned()
    }

    fn info(&self) -> Value {
        self.info.clone()
    }

    fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

struct Core {
    aid: ActorId,
    config: RuntimeConfig,
    mailbox_addr: SocketAddr,
    events: EventHub,
    started_at: DateTime<Utc>,
    connections: HashMap<SocketAddr, Connection>,
    routes: HashMap<ActorId, SocketAddr>,
    actors: HashMap<ActorId, ActorProxy>,
    names: HashMap<String, ActorId>,
    monitors: HashMap<String, MonitorPool>,
    pending_spawns: HashMap<ActorId, PendingSpawn>,
    spawn_seq: u64,
    stopping: bool,
    forced: bool,
    shutdown_deadline: Option<DateTime<Utc>>,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

/// The root supervisor.
///
/// Built with [`bind`](Self::bind), which opens the mailbox server on an
/// OS-assigned local port, then driven to completion with
/// [`serve`](Self::serve). The returned [`ArbiterHandle`] is the only way
/// to talk to a running arbiter from outside its loop.
pub struct Arbiter {
    core: Core,
    server: Server,
    conn_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    shutdown_rx: watch::Receiver<bool>,
    // Keeps the default (signal-less) shutdown channel alive.
    _shutdown_tx: Option<watch::Sender<bool>>,
}

impl Arbiter {
    /// Open the mailbox server and assemble the arbiter.
    pub async fn bind(config: RuntimeConfig) -> Result<(Self, ArbiterHandle), ArbiterError> {
        config.validate().map_err(ArbiterError::Config)?;

        let time = TimeTracker::start();
        let (event_sink, conn_events) = mpsc::unbounded_channel();
        let producer = mailbox_producer(time, event_sink, config.max_frame_size);
        let server = Server::bind(
            "mailbox",
            "127.0.0.1:0".parse().map_err(|_| {
                ArbiterError::Config("cannot parse loopback bind address".to_owned())
            })?,
            producer,
        )
        .await?;
        let mailbox_addr = server.local_addr();

        let aid = ActorId::new();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = ArbiterHandle::new(aid, mailbox_addr, control_tx);

        let events = EventHub::new();
        events.declare_once(START_EVENT);
        events.declare_once(STOP_EVENT);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let arbiter = Self {
            core: Core {
                aid,
                config,
                mailbox_addr,
                events,
                started_at: Utc::now(),
                connections: HashMap::new(),
                routes: HashMap::new(),
                actors: HashMap::new(),
                names: HashMap::new(),
                monitors: HashMap::new(),
                pending_spawns: HashMap::new(),
                spawn_seq: 0,
                stopping: false,
                forced: false,
                shutdown_deadline: None,
                stop_waiters: Vec::new(),
            },
            server,
            conn_events,
            control_rx,
            shutdown_rx,
            _shutdown_tx: Some(shutdown_tx),
        };
        Ok((arbiter, handle))
    }

    /// Replace the shutdown signal with an external one (the signal
    /// handler's channel).
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = shutdown_rx;
        self._shutdown_tx = None;
        self
    }

    /// The arbiter's own actor identity.
    pub fn aid(&self) -> ActorId {
        self.core.aid
    }

    /// Address of the mailbox server.
    pub fn mailbox_addr(&self) -> SocketAddr {
        self.core.mailbox_addr
    }

    /// Run until graceful shutdown completes (or is forced).
    pub async fn serve(mut self) -> Result<Shutdown, ArbiterError> {
        info!(aid = %self.core.aid, addr = %self.core.mailbox_addr, "arbiter started");
        self.core.events.fire(START_EVENT, None, None);

        let mut watchdog = interval(Duration::from_millis(250));
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control_closed = false;
        let mut shutdown_closed = false;

        loop {
            tokio::select! {
                maybe = self.conn_events.recv() => {
                    if let Some(event) = maybe {
                        self.core.handle_connection_event(event).await;
                    }
                }
                maybe = self.control_rx.recv(), if !control_closed => {
                    match maybe {
                        Some(message) => self.core.handle_control(message).await,
                        None => control_closed = true,
                    }
                }
                changed = self.shutdown_rx.changed(), if !shutdown_closed => {
                    match changed {
                        Ok(()) if *self.shutdown_rx.borrow() => self.core.begin_shutdown(),
                        Ok(()) => {}
                        Err(_) => shutdown_closed = true,
                    }
                }
                _ = watchdog.tick() => self.core.sweep(),
            }

            if self.core.finished() {
                break;
            }
        }

        self.server.close().await;
        for waiter in self.core.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!(aid = %self.core.aid, "arbiter terminated");
        Ok(if self.core.forced {
            Shutdown::Forced
        } else {
            Shutdown::Graceful
        })
    }
}

impl Core {
    // ------------------------------------------------------------------
    // Connection events
    // ------------------------------------------------------------------

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { peer, transport } => {
                debug!(%peer, "mailbox connection opened");
                self.connections.insert(peer, Connection::new(transport));
            }
            ConnectionEvent::Message { peer, message } => match message {
                MailboxMessage::Request(request) => self.handle_request(peer, request).await,
                MailboxMessage::Reply(reply) => self.handle_reply(peer, reply),
            },
            ConnectionEvent::Lost { peer, error } => self.handle_lost(peer, error),
        }
    }

    async fn handle_request(&mut self, peer: SocketAddr, request: Request) {
        let identified = self
            .connections
            .get(&peer)
            .and_then(|conn| conn.aid)
            .is_some();

        if !identified {
            if request.command == command::NOTIFY {
                self.handle_handshake(peer, request);
            } else {
                warn!(%peer, verb = %request.command, "request before handshake");
                if request.ack {
                    self.write_reply(peer, Reply::err(request.id, "handshake required"));
                }
            }
            return;
        }

        if request.target == self.aid {
            self.handle_arbiter_request(peer, request).await;
        } else {
            self.proxy_request(peer, request);
        }
    }

    /// The first `notify` on a connection: bind its aid, install the
    /// route, complete any pending spawn.
    fn handle_handshake(&mut self, peer: SocketAddr, request: Request) {
        let aid = match request
            .kwargs
            .get("aid")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<ActorId>().ok())
        {
            Some(aid) => aid,
            None => {
                warn!(%peer, "handshake without a valid aid");
                if request.ack {
                    self.write_reply(peer, Reply::err(request.id, "handshake requires an aid"));
                }
                return;
            }
        };
        let info = request.kwargs.get("info").cloned().unwrap_or(Value::Null);

        if let Some(conn) = self.connections.get_mut(&peer) {
            conn.aid = Some(aid);
        }
        self.routes.insert(aid, peer);

        match self.pending_spawns.remove(&aid) {
            Some(pending) => {
                let mut proxy = pending.proxy;
                proxy.handshake(peer, info);
                info!(%aid, name = %proxy.name(), "actor handshake complete");
                self.names.insert(proxy.name().to_owned(), aid);
                self.actors.insert(aid, proxy);
                match pending.reply {
                    SpawnReply::Handle(tx) => {
                        let _ = tx.send(Ok(aid));
                    }
                    SpawnReply::Wire { peer: origin, id } => {
                        self.write_reply(origin, Reply::ok(id, Value::from(aid.to_string())));
                    }
                    SpawnReply::Pool => {}
                }
            }
            None => {
                // An actor this arbiter did not spawn; register it anyway.
                let name = info
                    .as_map()
                    .and_then(|map| map.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("external")
                    .to_owned();
                info!(%aid, %name, "external actor connected");
                let mut proxy = ActorProxy::external(aid, name);
                proxy.handshake(peer, info);
                self.names.insert(proxy.name().to_owned(), aid);
                self.actors.insert(aid, proxy);
            }
        }

        if request.ack {
            self.write_reply(peer, Reply::ok(request.id, Value::Null));
        }
    }

    /// A request addressed to the arbiter itself.
    async fn handle_arbiter_request(&mut self, peer: SocketAddr, request: Request) {
        match request.command.as_str() {
            command::NOTIFY => {
                if let Some(proxy) = self.actors.get_mut(&request.sender) {
                    let info = request.kwargs.get("info").cloned().unwrap_or(Value::Null);
                    proxy.record_notify(info);
                }
                if request.ack {
                    self.write_reply(peer, Reply::ok(request.id, Value::Null));
                }
            }
            command::SPAWN => {
                let spawn_request = match spawn_request_from_kwargs(&request.kwargs) {
                    Ok(spawn_request) => spawn_request,
                    Err(reason) => {
                        if request.ack {
                            self.write_reply(peer, Reply::err(request.id, reason));
                        }
                        return;
                    }
                };
                let reply = if request.ack {
                    SpawnReply::Wire {
                        peer,
                        id: request.id,
                    }
                } else {
                    SpawnReply::Pool
                };
                if let Err(error) = self.start_spawn(spawn_request, None, reply) {
                    debug!(%error, "wire spawn failed");
                }
            }
            _ => {
                let stop_flag = Arc::new(AtomicBool::new(false));
                let target: Arc<dyn CommandTarget> = Arc::new(ArbiterTarget {
                    aid: self.aid,
                    info: self.arbiter_info(),
                    stop_flag: Arc::clone(&stop_flag),
                });
                let command_request = CommandRequest::new(target, &request);
                let result = command::global()
                    .dispatch(&request.command, command_request)
                    .await;
                if request.ack {
                    let reply = match result {
                        Ok(value) => Reply::ok(request.id, value),
                        Err(error) => Reply::err(request.id, error.to_string()),
                    };
                    self.write_reply(peer, reply);
                }
                if stop_flag.load(Ordering::SeqCst) {
                    self.begin_shutdown();
                }
            }
        }
    }

    /// Forward a request to its target, rewriting the hop-level id.
    fn proxy_request(&mut self, origin: SocketAddr, request: Request) {
        let Some(target_peer) = self.routes.get(&request.target).copied() else {
            debug!(target = %request.target, "no route for target");
            if request.ack {
                self.write_reply(
                    origin,
                    Reply::err(request.id, format!("unknown target actor: {}", request.target)),
                );
            }
            return;
        };
        let Some(conn) = self.connections.get_mut(&target_peer) else {
            if request.ack {
                self.write_reply(
                    origin,
                    Reply::err(request.id, format!("unknown target actor: {}", request.target)),
                );
            }
            return;
        };

        let out_id = conn.alloc_id();
        if request.ack {
            conn.entries.insert(
                out_id,
                PendingEntry::Proxied {
                    origin,
                    origin_id: request.id,
                },
            );
        }
        let mut forwarded = request;
        forwarded.id = out_id;
        let transport = conn.transport.clone();
        self.write_message(&transport, MailboxMessage::Request(forwarded));
    }

    fn handle_reply(&mut self, peer: SocketAddr, reply: Reply) {
        let entry = match self.connections.get_mut(&peer) {
            Some(conn) => conn.entries.remove(&reply.id),
            None => None,
        };
        match entry {
            Some(PendingEntry::Local(tx)) => {
                let outcome = reply.result.map_err(ArbiterError::Remote);
                let _ = tx.send(outcome);
            }
            Some(PendingEntry::Discard) => {}
            Some(PendingEntry::Proxied { origin, origin_id }) => {
                let mut routed = reply;
                routed.id = origin_id;
                self.write_reply(origin, routed);
            }
            None => {
                debug!(%peer, id = reply.id, "reply for unknown request dropped");
            }
        }
    }

    fn handle_lost(&mut self, peer: SocketAddr, error: Option<crate::events::EventError>) {
        let Some(conn) = self.connections.remove(&peer) else {
            return;
        };
        debug!(%peer, ?error, "mailbox connection lost");

        for (_, entry) in conn.entries {
            match entry {
                PendingEntry::Local(tx) => {
                    let _ = tx.send(Err(ArbiterError::Mailbox(MailboxError::ConnectionLost)));
                }
                PendingEntry::Discard => {}
                PendingEntry::Proxied { origin, origin_id } => {
                    self.write_reply(origin, Reply::err(origin_id, "connection lost"));
                }
            }
        }

        if let Some(aid) = conn.aid {
            self.routes.remove(&aid);
            self.actor_terminated(aid);
        }
    }

    fn actor_terminated(&mut self, aid: ActorId) {
        let Some(mut proxy) = self.actors.remove(&aid) else {
            return;
        };
        proxy.mark_terminated();
        if self.names.get(proxy.name()) == Some(&aid) {
            self.names.remove(proxy.name());
        }
        if let Some(monitor_aid) = proxy.monitor() {
            for pool in self.monitors.values_mut() {
                if pool.aid() == monitor_aid {
                    pool.worker_terminated(aid);
                    break;
                }
            }
        }
        info!(%aid, name = %proxy.name(), "actor terminated");
    }

    // ------------------------------------------------------------------
    // Control channel
    // ------------------------------------------------------------------

    async fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Spawn { request, reply } => {
                let _ = self.start_spawn(request, None, SpawnReply::Handle(reply));
            }
            ControlMessage::Send {
                target,
                verb,
                args,
                kwargs,
                reply,
            } => {
                if target == self.aid {
                    let result = self.dispatch_local(&verb, args, kwargs).await;
                    let _ = reply.send(result);
                } else {
                    self.send_request(target, &verb, args, kwargs, PendingEntry::Local(reply));
                }
            }
            ControlMessage::AddMonitor {
                name,
                kind,
                mode,
                workers,
                reply,
            } => {
                let result = self.add_monitor(name, kind, mode, workers);
                let _ = reply.send(result);
            }
            ControlMessage::ResizeMonitor {
                name,
                target,
                reply,
            } => {
                let result = match self.monitors.get_mut(&name) {
                    Some(pool) => {
                        info!(monitor = %name, target, "resizing pool");
                        pool.manage_workers(target);
                        Ok(())
                    }
                    None => Err(ArbiterError::UnknownName(name)),
                };
                let _ = reply.send(result);
            }
            ControlMessage::Lookup { name, reply } => {
                let found = self
                    .names
                    .get(&name)
                    .copied()
                    .or_else(|| self.monitors.get(&name).map(MonitorPool::aid));
                let _ = reply.send(found);
            }
            ControlMessage::MonitorWorkers { name, reply } => {
                let result = match self.monitors.get(&name) {
                    Some(pool) => Ok(pool.workers().collect()),
                    None => Err(ArbiterError::UnknownName(name)),
                };
                let _ = reply.send(result);
            }
            ControlMessage::Directory { reply } => {
                let _ = reply.send(self.directory());
            }
            ControlMessage::FireReload => {
                info!("reload event fired");
                self.events.fire(RELOAD_EVENT, None, None);
            }
            ControlMessage::Stop { reply } => {
                self.stop_waiters.push(reply);
                self.begin_shutdown();
            }
        }
    }

    /// Dispatch a verb against the arbiter itself (handle path).
    async fn dispatch_local(
        &mut self,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, ArbiterError> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let target: Arc<dyn CommandTarget> = Arc::new(ArbiterTarget {
            aid: self.aid,
            info: self.arbiter_info(),
            stop_flag: Arc::clone(&stop_flag),
        });
        let request = CommandRequest {
            target,
            caller: self.aid,
            args,
            kwargs,
        };
        let result = command::global()
            .dispatch(verb, request)
            .await
            .map_err(|error| ArbiterError::Remote(error.to_string()));
        if stop_flag.load(Ordering::SeqCst) {
            self.begin_shutdown();
        }
        result
    }

    fn add_monitor(
        &mut self,
        name: String,
        kind: String,
        mode: crate::actor::ConcurrencyMode,
        workers: usize,
    ) -> Result<ActorId, ArbiterError> {
        if self.stopping {
            return Err(ArbiterError::NotRunning);
        }
        if self.monitors.contains_key(&name) || self.names.contains_key(&name) {
            return Err(ArbiterError::SpawnFailed(format!("name taken: {name}")));
        }
        let pool = MonitorPool::new(name.clone(), kind, mode, workers);
        let aid = pool.aid();
        info!(monitor = %name, %aid, workers, "monitor created");
        self.monitors.insert(name.clone(), pool);
        // The monitor's start hook: bring the pool up immediately.
        self.spawn_pool_workers(&name);
        Ok(aid)
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    fn start_spawn(
        &mut self,
        request: SpawnRequest,
        monitor: Option<ActorId>,
        reply: SpawnReply,
    ) -> Result<ActorId, ArbiterError> {
        if self.stopping {
            self.fail_spawn(reply, "arbiter is stopping");
            return Err(ArbiterError::NotRunning);
        }

        let aid = ActorId::new();
        self.spawn_seq += 1;
        let name = request
            .name
            .unwrap_or_else(|| format!("{}-{}", request.kind, self.spawn_seq));
        let params = SpawnParams {
            aid,
            name: name.clone(),
            kind: request.kind.clone(),
            mode: request.mode,
            mailbox_addr: request.mailbox_addr.unwrap_or(self.mailbox_addr),
            supervisor: self.aid,
            handshake_timeout: self.config.handshake_timeout,
            heartbeat_interval: self.config.heartbeat_interval,
            max_frame_size: self.config.max_frame_size,
        };

        match spawn_child(params) {
            Ok(child) => {
                let mut proxy = ActorProxy::new(aid, name, request.kind, request.mode, monitor);
                proxy.attach_child(child);
                let margin = Duration::from_secs(2);
                let deadline = Utc::now()
                    + chrono::Duration::from_std(self.config.handshake_timeout + margin)
                        .unwrap_or_else(|_| chrono::Duration::seconds(10));
                debug!(%aid, "child spawned, awaiting handshake");
                self.pending_spawns.insert(
                    aid,
                    PendingSpawn {
                        proxy,
                        reply,
                        deadline,
                    },
                );
                Ok(aid)
            }
            Err(error) => {
                let message = error.to_string();
                warn!(%message, "spawn failed");
                self.fail_spawn(reply, &message);
                Err(ArbiterError::Actor(error))
            }
        }
    }

    fn fail_spawn(&mut self, reply: SpawnReply, reason: &str) {
        match reply {
            SpawnReply::Handle(tx) => {
                let _ = tx.send(Err(ArbiterError::SpawnFailed(reason.to_owned())));
            }
            SpawnReply::Wire { peer, id } => {
                self.write_reply(peer, Reply::err(id, reason));
            }
            SpawnReply::Pool => {}
        }
    }

    fn spawn_pool_workers(&mut self, name: &str) {
        let Some(pool) = self.monitors.get_mut(name) else {
            return;
        };
        let wanted = pool.plan_spawns();
        if wanted == 0 {
            return;
        }
        let kind = pool.kind().to_owned();
        let mode = pool.mode();
        let monitor_aid = pool.aid();
        for _ in 0..wanted {
            let request = SpawnRequest {
                kind: kind.clone(),
                name: None,
                mode,
                mailbox_addr: None,
            };
            if let Ok(aid) = self.start_spawn(request, Some(monitor_aid), SpawnReply::Pool) {
                if let Some(pool) = self.monitors.get_mut(name) {
                    pool.worker_spawned(aid);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Periodic sweep
    // ------------------------------------------------------------------

    fn sweep(&mut self) {
        self.sweep_pending_spawns();
        self.sweep_stale_actors();
        if !self.stopping {
            self.sweep_pools();
        } else {
            self.sweep_shutdown();
        }
    }

    /// Fail spawns whose child died early or never handshook in time.
    fn sweep_pending_spawns(&mut self) {
        let now = Utc::now();
        let mut expired = Vec::new();
        for (aid, pending) in self.pending_spawns.iter_mut() {
            if now > pending.deadline || pending.proxy.child_finished() {
                expired.push(*aid);
            }
        }

        for aid in expired {
            let Some(mut pending) = self.pending_spawns.remove(&aid) else {
                continue;
            };
            warn!(%aid, name = %pending.proxy.name(), "handshake timeout");
            pending.proxy.force_kill_child();
            let monitor = pending.proxy.monitor();
            match pending.reply {
                SpawnReply::Handle(tx) => {
                    let _ = tx.send(Err(ArbiterError::HandshakeTimeout(aid)));
                }
                SpawnReply::Wire { peer, id } => {
                    self.write_reply(peer, Reply::err(id, format!("handshake timeout for {aid}")));
                }
                SpawnReply::Pool => {}
            }
            if let Some(monitor_aid) = monitor {
                for pool in self.monitors.values_mut() {
                    if pool.aid() == monitor_aid {
                        pool.worker_terminated(aid);
                        break;
                    }
                }
            }
        }
    }

    /// The supervisor half of the watchdog: children silent beyond the
    /// heartbeat timeout are stopped, then force-killed.
    fn sweep_stale_actors(&mut self) {
        let timeout = self.config.heartbeat_timeout;
        let stale: Vec<ActorId> = self
            .actors
            .iter()
            .filter(|(_, proxy)| proxy.is_stale(timeout) && !proxy.is_terminated())
            .map(|(aid, _)| *aid)
            .collect();

        for aid in stale {
            let state = match self.actors.get(&aid) {
                Some(proxy) => proxy.state(),
                None => continue,
            };
            if state >= ActorState::Stopping {
                // Second strike: past grace, kill outright.
                warn!(%aid, "stale child did not stop, force-killing");
                if let Some(proxy) = self.actors.get_mut(&aid) {
                    proxy.force_kill_child();
                }
                if let Some(peer) = self.routes.remove(&aid) {
                    self.connections.remove(&peer);
                }
                self.actor_terminated(aid);
            } else {
                warn!(%aid, "child heartbeat stale, stopping it");
                self.send_stop(aid);
            }
        }
    }

    /// Monitor periodic task: shrink surplus, replace the fallen.
    fn sweep_pools(&mut self) {
        let names: Vec<String> = self.monitors.keys().cloned().collect();
        for name in names {
            let stops: Vec<ActorId> = self
                .monitors
                .get(&name)
                .map(|pool| pool.plan_stops())
                .unwrap_or_default();
            for aid in stops {
                info!(monitor = %name, worker = %aid, "stopping surplus worker");
                self.send_stop(aid);
                if let Some(pool) = self.monitors.get_mut(&name) {
                    pool.worker_released(aid);
                }
            }
            self.spawn_pool_workers(&name);
        }
    }

    fn sweep_shutdown(&mut self) {
        if self.all_children_gone() {
            return;
        }
        let deadline_passed = self
            .shutdown_deadline
            .map(|deadline| Utc::now() > deadline)
            .unwrap_or(false);
        if !deadline_passed {
            return;
        }

        warn!("graceful timeout exceeded, force-terminating children");
        self.forced = true;
        let remaining: Vec<ActorId> = self.actors.keys().copied().collect();
        for aid in remaining {
            if let Some(proxy) = self.actors.get_mut(&aid) {
                proxy.force_kill_child();
            }
            if let Some(peer) = self.routes.remove(&aid) {
                self.connections.remove(&peer);
            }
            self.actor_terminated(aid);
        }
        for (aid, mut pending) in std::mem::take(&mut self.pending_spawns) {
            pending.proxy.force_kill_child();
            debug!(%aid, "pending spawn killed during forced shutdown");
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    fn begin_shutdown(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        info!("arbiter stopping");
        self.events.fire(STOP_EVENT, None, None);
        self.shutdown_deadline = Some(
            Utc::now()
                + chrono::Duration::from_std(self.config.graceful_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        );

        // Monitors first: no replacements from here on.
        for pool in self.monitors.values_mut() {
            pool.begin_stop();
        }
        // Then every child, workers and direct actors alike.
        let children: Vec<ActorId> = self
            .actors
            .iter()
            .filter(|(_, proxy)| !proxy.is_terminated() && proxy.kind() != "external")
            .map(|(aid, _)| *aid)
            .collect();
        for aid in children {
            self.send_stop(aid);
        }
        // Children that never handshook get the OS-level signal.
        for pending in self.pending_spawns.values_mut() {
            pending.proxy.terminate_child();
        }
    }

    fn all_children_gone(&self) -> bool {
        self.pending_spawns.is_empty()
            && self
                .actors
                .values()
                .all(|proxy| proxy.kind() == "external" || proxy.is_terminated())
    }

    fn finished(&self) -> bool {
        self.stopping && self.all_children_gone()
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Send a `stop` command to a child (and nudge its process).
    fn send_stop(&mut self, aid: ActorId) {
        if let Some(proxy) = self.actors.get_mut(&aid) {
            proxy.mark_stopping();
        }
        if self.routes.contains_key(&aid) {
            self.send_request(
                aid,
                command::STOP,
                Vec::new(),
                BTreeMap::new(),
                PendingEntry::Discard,
            );
        } else if let Some(proxy) = self.actors.get_mut(&aid) {
            proxy.terminate_child();
        } else if let Some(pending) = self.pending_spawns.get_mut(&aid) {
            // Not handshaken yet: the OS-level signal is all there is.
            pending.proxy.terminate_child();
        }
    }

    /// Send one of the arbiter's own requests to a routed actor.
    fn send_request(
        &mut self,
        target: ActorId,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        entry: PendingEntry,
    ) {
        let Some(peer) = self.routes.get(&target).copied() else {
            if let PendingEntry::Local(tx) = entry {
                let _ = tx.send(Err(ArbiterError::UnknownTarget(target)));
            }
            return;
        };
        let Some(conn) = self.connections.get_mut(&peer) else {
            if let PendingEntry::Local(tx) = entry {
                let _ = tx.send(Err(ArbiterError::UnknownTarget(target)));
            }
            return;
        };

        let id = conn.alloc_id();
        // Discard entries are inserted too: they absorb the reply.
        conn.entries.insert(id, entry);
        let request = Request {
            id,
            command: verb.to_owned(),
            sender: self.aid,
            target,
            ack: true,
            args,
            kwargs,
        };
        let transport = conn.transport.clone();
        self.write_message(&transport, MailboxMessage::Request(request));
    }

    fn write_reply(&mut self, peer: SocketAddr, reply: Reply) {
        let Some(conn) = self.connections.get(&peer) else {
            return;
        };
        let transport = conn.transport.clone();
        self.write_message(&transport, MailboxMessage::Reply(reply));
    }

    fn write_message(&mut self, transport: &Transport, message: MailboxMessage) {
        let mut codec = MessageCodec::new(self.config.max_frame_size);
        let mut buf = BytesMut::new();
        if codec.encode(message, &mut buf).is_err() {
            warn!("outbound message exceeded frame limits, dropped");
            return;
        }
        if transport.write(buf.freeze()).is_err() {
            debug!(peer = %transport.peer(), "write to closed connection dropped");
        }
    }

    fn arbiter_info(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("aid".to_owned(), Value::from(self.aid.to_string()));
        map.insert("name".to_owned(), Value::from("arbiter"));
        map.insert(
            "state".to_owned(),
            Value::from(if self.stopping { "stopping" } else { "running" }),
        );
        map.insert(
            "uptime".to_owned(),
            Value::Int(
                Utc::now()
                    .signed_duration_since(self.started_at)
                    .num_seconds(),
            ),
        );
        map.insert(
            "mailbox".to_owned(),
            Value::from(self.mailbox_addr.to_string()),
        );
        map.insert("actors".to_owned(), Value::Int(self.actors.len() as i64));
        map.insert(
            "monitors".to_owned(),
            Value::Int(self.monitors.len() as i64),
        );
        map.insert(
            "pools".to_owned(),
            Value::List(self.monitors.values().map(MonitorPool::snapshot).collect()),
        );
        Value::Map(map)
    }

    fn directory(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "actors".to_owned(),
            Value::List(self.actors.values().map(ActorProxy::snapshot).collect()),
        );
        map.insert(
            "monitors".to_owned(),
            Value::List(self.monitors.values().map(MonitorPool::snapshot).collect()),
        );
        Value::Map(map)
    }
}

fn spawn_request_from_kwargs(
    kwargs: &BTreeMap<String, Value>,
) -> Result<SpawnRequest, String> {
    let kind = kwargs
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| "spawn requires a 'kind'".to_owned())?
        .to_owned();
    let name = kwargs
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let mode = match kwargs.get("mode").and_then(Value::as_str) {
        Some(raw) => raw.parse::<crate::actor::ConcurrencyMode>()?,
        None => crate::actor::ConcurrencyMode::default(),
    };
    Ok(SpawnRequest {
        kind,
        name,
        mode,
        mailbox_addr: None,
    })
}
