//! The arbiter's control handle.
//!
//! Everything outside the arbiter's event loop (the loader, tests,
//! embedding code) talks to the loop through this handle over a control
//! channel. The loop owns all supervision state; the handle only sends
//! messages and awaits replies, like any other actor would.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::net::SocketAddr;

// Layer 2: Third-party crate imports
use tokio::sync::{mpsc, oneshot};

// Layer 3: Internal module imports
use super::error::ArbiterError;
use crate::actor::ConcurrencyMode;
use crate::message::Value;
use crate::util::ActorId;

/// Parameters for spawning one direct child actor.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Registered actor kind
    pub kind: String,
    /// Actor name; defaults to the kind
    pub name: Option<String>,
    /// Process (default) or thread
    pub mode: ConcurrencyMode,
    /// Mailbox address handed to the child; defaults to the spawning
    /// arbiter's own server
    pub mailbox_addr: Option<SocketAddr>,
}

impl SpawnRequest {
    /// Spawn request with defaults for `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            mode: ConcurrencyMode::default(),
            mailbox_addr: None,
        }
    }

    /// Set the actor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the concurrency mode.
    pub fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Point the child at a specific mailbox address instead of the
    /// spawning arbiter's own server.
    pub fn with_mailbox_addr(mut self, addr: SocketAddr) -> Self {
        self.mailbox_addr = Some(addr);
        self
    }
}

/// Messages into the arbiter loop.
pub(crate) enum ControlMessage {
    Spawn {
        request: SpawnRequest,
        reply: oneshot::Sender<Result<ActorId, ArbiterError>>,
    },
    Send {
        target: ActorId,
        verb: String,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        reply: oneshot::Sender<Result<Value, ArbiterError>>,
    },
    AddMonitor {
        name: String,
        kind: String,
        mode: ConcurrencyMode,
        workers: usize,
        reply: oneshot::Sender<Result<ActorId, ArbiterError>>,
    },
    ResizeMonitor {
        name: String,
        target: usize,
        reply: oneshot::Sender<Result<(), ArbiterError>>,
    },
    Lookup {
        name: String,
        reply: oneshot::Sender<Option<ActorId>>,
    },
    MonitorWorkers {
        name: String,
        reply: oneshot::Sender<Result<Vec<ActorId>, ArbiterError>>,
    },
    Directory {
        reply: oneshot::Sender<Value>,
    },
    FireReload,
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running arbiter.
#[derive(Clone, Debug)]
pub struct ArbiterHandle {
    aid: ActorId,
    mailbox_addr: SocketAddr,
    control: mpsc::UnboundedSender<ControlMessage>,
}

impl ArbiterHandle {
    pub(crate) fn new(
        aid: ActorId,
        mailbox_addr: SocketAddr,
        control: mpsc::UnboundedSender<ControlMessage>,
    ) -> Self {
        Self {
            aid,
            mailbox_addr,
            control,
        }
    }

    /// The arbiter's own actor identity.
    pub fn aid(&self) -> ActorId {
        self.aid
    }

    /// Address of the mailbox server actors connect back to.
    pub fn mailbox_addr(&self) -> SocketAddr {
        self.mailbox_addr
    }

    /// Spawn a direct child; resolves with its aid after the handshake.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<ActorId, ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::Spawn { request, reply })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)?
    }

    /// Send a command to any actor, routed through the arbiter.
    pub async fn send(
        &self,
        target: ActorId,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::Send {
            target,
            verb: verb.to_owned(),
            args,
            kwargs,
            reply,
        })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)?
    }

    /// Create a monitor maintaining `workers` actors of `kind`.
    pub async fn add_monitor(
        &self,
        name: &str,
        kind: &str,
        mode: ConcurrencyMode,
        workers: usize,
    ) -> Result<ActorId, ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::AddMonitor {
            name: name.to_owned(),
            kind: kind.to_owned(),
            mode,
            workers,
            reply,
        })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)?
    }

    /// Resize a monitor's pool.
    pub async fn resize_monitor(&self, name: &str, target: usize) -> Result<(), ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::ResizeMonitor {
            name: name.to_owned(),
            target,
            reply,
        })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)?
    }

    /// Resolve a name to an aid through the directory.
    pub async fn lookup(&self, name: &str) -> Result<Option<ActorId>, ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::Lookup {
            name: name.to_owned(),
            reply,
        })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)
    }

    /// The aids of a monitor's current workers.
    pub async fn monitor_workers(&self, name: &str) -> Result<Vec<ActorId>, ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::MonitorWorkers {
            name: name.to_owned(),
            reply,
        })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)?
    }

    /// Snapshot of the whole directory (actors and monitors).
    pub async fn directory(&self) -> Result<Value, ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::Directory { reply })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)
    }

    /// Fire the reload hook (SIGHUP path).
    pub fn fire_reload(&self) {
        let _ = self.control.send(ControlMessage::FireReload);
    }

    /// Begin graceful shutdown; resolves once the arbiter exited.
    pub async fn stop(&self) -> Result<(), ArbiterError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ControlMessage::Stop { reply })?;
        rx.await.map_err(|_| ArbiterError::NotRunning)?;
        Ok(())
    }

    fn submit(&self, message: ControlMessage) -> Result<(), ArbiterError> {
        self.control
            .send(message)
            .map_err(|_| ArbiterError::NotRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_request_builder() {
        let request = SpawnRequest::new("echo")
            .with_name("worker-1")
            .with_mode(ConcurrencyMode::Thread);

        assert_eq!(request.kind, "echo");
        assert_eq!(request.name.as_deref(), Some("worker-1"));
        assert_eq!(request.mode, ConcurrencyMode::Thread);
        assert!(request.mailbox_addr.is_none());
    }

    #[test]
    fn test_spawn_request_mailbox_override() {
        let addr: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        let request = SpawnRequest::new("echo").with_mailbox_addr(addr);

        assert_eq!(request.mailbox_addr, Some(addr));
    }

    #[tokio::test]
    async fn test_handle_reports_not_running_after_loop_gone() {
        let (control, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ArbiterHandle::new(
            ActorId::new(),
            "127.0.0.1:1".parse().unwrap(),
            control,
        );

        let result = handle.spawn(SpawnRequest::new("echo")).await;
        assert!(matches!(result, Err(ArbiterError::NotRunning)));
    }
}
