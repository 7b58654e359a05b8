//! Supervisor-held actor records.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use crate::actor::{ActorLifecycle, ActorState, ConcurrencyMode, SpawnedChild};
use crate::message::Value;
use crate::util::ActorId;

/// What a supervisor knows about one child actor.
///
/// The proxy is authoritative for supervision (spawn parameters,
/// heartbeat bookkeeping, lifecycle as observed from outside), never for
/// the actor's internal state. Holders look proxies up by aid in the
/// supervisor's directory; a missing entry means the actor is gone.
#[derive(Debug)]
pub struct ActorProxy {
    aid: ActorId,
    name: String,
    kind: String,
    mode: ConcurrencyMode,
    /// The owning monitor, if this worker belongs to a pool.
    monitor: Option<ActorId>,
    /// Peer address of the actor's mailbox connection, set at handshake.
    mailbox_peer: Option<SocketAddr>,
    last_notify: Option<DateTime<Utc>>,
    info: Value,
    lifecycle: ActorLifecycle,
    child: Option<SpawnedChild>,
}

impl ActorProxy {
    /// Record for a child this supervisor spawned.
    pub fn new(
        aid: ActorId,
        name: impl Into<String>,
        kind: impl Into<String>,
        mode: ConcurrencyMode,
        monitor: Option<ActorId>,
    ) -> Self {
        Self {
            aid,
            name: name.into(),
            kind: kind.into(),
            mode,
            monitor,
            mailbox_peer: None,
            last_notify: None,
            info: Value::Null,
            lifecycle: ActorLifecycle::new(),
            child: None,
        }
    }

    /// Record for an actor that connected on its own (not spawned here).
    pub fn external(aid: ActorId, name: impl Into<String>) -> Self {
        let mut proxy = Self::new(aid, name, "external", ConcurrencyMode::Process, None);
        proxy.lifecycle.transition_to(ActorState::Starting);
        proxy
    }

    /// The actor's identity.
    pub fn aid(&self) -> ActorId {
        self.aid
    }

    /// The actor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The actor's kind (factory key).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Process or thread.
    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// The monitor owning this worker, if pooled.
    pub fn monitor(&self) -> Option<ActorId> {
        self.monitor
    }

    /// Lifecycle as observed by the supervisor.
    pub fn state(&self) -> ActorState {
        self.lifecycle.state()
    }

    /// Peer address of the mailbox connection, once handshaken.
    pub fn mailbox_peer(&self) -> Option<SocketAddr> {
        self.mailbox_peer
    }

    /// Last heartbeat timestamp.
    pub fn last_notify(&self) -> Option<DateTime<Utc>> {
        self.last_notify
    }

    /// The info map from the last heartbeat.
    pub fn info(&self) -> &Value {
        &self.info
    }

    /// Attach the OS-level child handle after spawn.
    pub fn attach_child(&mut self, child: SpawnedChild) {
        self.child = Some(child);
        self.lifecycle.transition_to(ActorState::Starting);
    }

    /// Handshake: bind the mailbox connection and enter `Running`.
    pub fn handshake(&mut self, peer: SocketAddr, info: Value) {
        self.mailbox_peer = Some(peer);
        self.record_notify(info);
        self.lifecycle.transition_to(ActorState::Running);
    }

    /// Record a heartbeat and its info payload.
    pub fn record_notify(&mut self, info: Value) {
        self.last_notify = Some(Utc::now());
        if !info.is_null() {
            self.info = info;
        }
    }

    /// True when no heartbeat arrived within `timeout`.
    ///
    /// Actors that never handshook are judged from record creation.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        let reference = self
            .last_notify
            .unwrap_or_else(|| self.lifecycle.created_at());
        let age = Utc::now().signed_duration_since(reference);
        age.num_milliseconds() > timeout.as_millis() as i64
    }

    /// The supervisor asked this child to stop.
    pub fn mark_stopping(&mut self) {
        self.lifecycle.transition_to(ActorState::Stopping);
    }

    /// The child is gone; reap its OS handle.
    pub fn mark_terminated(&mut self) {
        self.lifecycle.transition_to(ActorState::Terminated);
        if let Some(child) = self.child.as_mut() {
            child.reap();
        }
    }

    /// True once the supervisor observed termination.
    pub fn is_terminated(&self) -> bool {
        self.lifecycle.is_terminated()
    }

    /// Send SIGTERM to a process child (no-op for threads).
    pub fn terminate_child(&mut self) {
        if let Some(child) = self.child.as_mut() {
            child.terminate();
        }
    }

    /// Force-kill a process child past the graceful deadline.
    pub fn force_kill_child(&mut self) {
        if let Some(child) = self.child.as_mut() {
            child.force_kill();
        }
    }

    /// True if the OS-level child has exited or returned.
    pub fn child_finished(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => child.is_finished(),
            None => self.is_terminated(),
        }
    }

    /// Snapshot for directory listings.
    pub fn snapshot(&self) -> Value {
        let mut map = std::collections::BTreeMap::new();
        map.insert("aid".to_owned(), Value::from(self.aid.to_string()));
        map.insert("name".to_owned(), Value::from(self.name.clone()));
        map.insert("kind".to_owned(), Value::from(self.kind.clone()));
        map.insert("mode".to_owned(), Value::from(self.mode.to_string()));
        map.insert("state".to_owned(), Value::from(self.state().label()));
        map.insert(
            "last_notified".to_owned(),
            match self.last_notify {
                Some(at) => Value::Float(at.timestamp_millis() as f64 / 1000.0),
                None => Value::Null,
            },
        );
        map.insert("info".to_owned(), self.info.clone());
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ActorProxy {
        ActorProxy::new(
            ActorId::new(),
            "worker-1",
            "echo",
            ConcurrencyMode::Thread,
            None,
        )
    }

    #[test]
    fn test_new_proxy_in_inception() {
        let proxy = proxy();
        assert_eq!(proxy.state(), ActorState::Inception);
        assert!(proxy.mailbox_peer().is_none());
        assert!(proxy.last_notify().is_none());
    }

    #[test]
    fn test_handshake_enters_running() {
        let mut proxy = proxy();
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        proxy.handshake(peer, Value::map());

        assert_eq!(proxy.state(), ActorState::Running);
        assert_eq!(proxy.mailbox_peer(), Some(peer));
        assert!(proxy.last_notify().is_some());
    }

    #[test]
    fn test_notify_updates_info() {
        let mut proxy = proxy();
        let mut info = std::collections::BTreeMap::new();
        info.insert("requests_processed".to_owned(), Value::Int(3));

        proxy.record_notify(Value::Map(info.clone()));

        assert_eq!(proxy.info(), &Value::Map(info));
    }

    #[test]
    fn test_null_notify_keeps_previous_info() {
        let mut proxy = proxy();
        proxy.record_notify(Value::from("snapshot"));
        proxy.record_notify(Value::Null);

        assert_eq!(proxy.info(), &Value::from("snapshot"));
    }

    #[test]
    fn test_staleness() {
        let mut proxy = proxy();
        // Fresh record, generous timeout: not stale.
        assert!(!proxy.is_stale(Duration::from_secs(30)));
        // Zero timeout: everything is stale.
        std::thread::sleep(Duration::from_millis(5));
        assert!(proxy.is_stale(Duration::from_millis(1)));

        proxy.record_notify(Value::Null);
        assert!(!proxy.is_stale(Duration::from_secs(30)));
    }

    #[test]
    fn test_termination_is_terminal() {
        let mut proxy = proxy();
        proxy.handshake("127.0.0.1:5000".parse().unwrap(), Value::Null);
        proxy.mark_stopping();
        proxy.mark_terminated();

        assert!(proxy.is_terminated());
        assert_eq!(proxy.state(), ActorState::Terminated);
    }

    #[test]
    fn test_snapshot_fields() {
        let mut proxy = proxy();
        proxy.handshake("127.0.0.1:5000".parse().unwrap(), Value::map());

        let snapshot = proxy.snapshot();
        let map = snapshot.as_map().unwrap();
        assert_eq!(map.get("name"), Some(&Value::from("worker-1")));
        assert_eq!(map.get("state"), Some(&Value::from("running")));
        assert_eq!(map.get("kind"), Some(&Value::from("echo")));
    }

    #[test]
    fn test_external_proxy() {
        let proxy = ActorProxy::external(ActorId::new(), "client");
        assert_eq!(proxy.kind(), "external");
        assert_eq!(proxy.state(), ActorState::Starting);
    }
}
