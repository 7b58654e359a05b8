//! Actor-side mailbox connection.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::MailboxError;
use super::pending::{PendingRequests, ReplyOutcome};
use super::state::MailboxState;
use crate::command;
use crate::message::{MailboxMessage, MessageCodec, Reply, Request, Value};
use crate::util::ActorId;

/// A request delivered to the actor through its mailbox.
pub type InboundRequest = Request;

type WireSink = SplitSink<Framed<TcpStream, MessageCodec>, MailboxMessage>;
type WireStream = SplitStream<Framed<TcpStream, MessageCodec>>;

enum Outbound {
    Message(MailboxMessage),
    Flush(tokio::sync::oneshot::Sender<()>),
}

/// The actor's persistent connection to the arbiter's mailbox server.
///
/// Exactly one exists per actor. Cloning shares the connection; the
/// backing tasks stop when every clone (and the inbound receiver) is
/// gone, which shuts the TCP stream down.
#[derive(Clone)]
pub struct MailboxClient {
    aid: ActorId,
    supervisor: ActorId,
    state: Arc<Mutex<MailboxState>>,
    pending: Arc<PendingRequests>,
    outbound: mpsc::UnboundedSender<Outbound>,
    local_addr: SocketAddr,
}

impl MailboxClient {
    /// Connect to the arbiter's mailbox server.
    ///
    /// Returns the client plus the stream of requests the arbiter routes
    /// to this actor; the stream ends when the connection is lost.
    pub async fn connect(
        addr: SocketAddr,
        aid: ActorId,
        supervisor: ActorId,
        max_frame_size: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundRequest>), MailboxError> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        let local_addr = stream.local_addr()?;

        let framed = Framed::new(stream, MessageCodec::new(max_frame_size));
        let (sink, wire) = framed.split();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingRequests::new());
        let state = Arc::new(Mutex::new(MailboxState::Handshaking));

        tokio::spawn(write_loop(sink, outbound_rx));
        tokio::spawn(read_loop(
            wire,
            Arc::clone(&pending),
            Arc::clone(&state),
            inbound_tx,
        ));

        debug!(%aid, %addr, "mailbox connected");
        Ok((
            Self {
                aid,
                supervisor,
                state,
                pending,
                outbound,
                local_addr,
            },
            inbound_rx,
        ))
    }

    /// This actor's identity.
    pub fn aid(&self) -> ActorId {
        self.aid
    }

    /// The supervisor (arbiter) identity this mailbox talks to.
    pub fn supervisor(&self) -> ActorId {
        self.supervisor
    }

    /// The local address of the connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current connection state.
    pub fn state(&self) -> MailboxState {
        *self.state.lock()
    }

    /// Number of requests still awaiting replies.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Perform the handshake: the first `notify`, binding this actor's
    /// aid to the connection on the arbiter side.
    ///
    /// On timeout the connection is useless and the caller exits.
    pub async fn handshake(
        &self,
        info: Value,
        handshake_timeout: Duration,
    ) -> Result<(), MailboxError> {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("aid".to_owned(), Value::from(self.aid.to_string()));
        kwargs.insert("info".to_owned(), info);

        let (id, rx) = self.submit(self.supervisor, command::NOTIFY, Vec::new(), kwargs)?;
        match timeout(handshake_timeout, rx).await {
            Ok(Ok(Ok(_))) => {
                self.state.lock().advance_to(MailboxState::Ready);
                debug!(aid = %self.aid, "handshake acknowledged");
                Ok(())
            }
            Ok(Ok(Err(error))) => Err(error),
            Ok(Err(_)) => Err(MailboxError::ConnectionLost),
            Err(_) => {
                self.pending.cancel(id);
                Err(MailboxError::HandshakeTimeout(handshake_timeout))
            }
        }
    }

    /// Send an acknowledged request and await the reply.
    pub async fn send(
        &self,
        target: ActorId,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, MailboxError> {
        let (_, rx) = self.submit(target, verb, args, kwargs)?;
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(MailboxError::ConnectionLost),
        }
    }

    /// Send an acknowledged request with a reply deadline.
    ///
    /// On timeout the pending entry is cancelled, so a late reply is
    /// dropped without side effects.
    pub async fn send_timeout(
        &self,
        target: ActorId,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        deadline: Duration,
    ) -> Result<Value, MailboxError> {
        let (id, rx) = self.submit(target, verb, args, kwargs)?;
        match timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(MailboxError::ConnectionLost),
            Err(_) => {
                self.pending.cancel(id);
                Err(MailboxError::ReplyTimeout(deadline))
            }
        }
    }

    /// Send a fire-and-forget request; no reply is ever delivered.
    pub fn send_noack(
        &self,
        target: ActorId,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<(), MailboxError> {
        if self.state().is_closing() {
            return Err(MailboxError::NotReady);
        }
        let request = Request {
            id: self.pending.next_id(),
            command: verb.to_owned(),
            sender: self.aid,
            target,
            ack: false,
            args,
            kwargs,
        };
        self.outbound
            .send(Outbound::Message(MailboxMessage::Request(request)))
            .map_err(|_| MailboxError::ConnectionLost)
    }

    /// Answer an inbound request with a result.
    pub fn reply_ok(&self, id: u32, result: Value) -> Result<(), MailboxError> {
        self.reply(Reply::ok(id, result))
    }

    /// Answer an inbound request with an error.
    pub fn reply_err(&self, id: u32, error: impl Into<String>) -> Result<(), MailboxError> {
        self.reply(Reply::err(id, error))
    }

    /// Wait until everything queued so far has been written to the OS.
    pub async fn flush(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self.outbound.send(Outbound::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Begin an orderly close. Dropping the last clone finishes it.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.advance_to(MailboxState::Closing) {
            debug!(aid = %self.aid, "mailbox closing");
        }
        state.advance_to(MailboxState::Closed);
    }

    fn reply(&self, reply: Reply) -> Result<(), MailboxError> {
        self.outbound
            .send(Outbound::Message(MailboxMessage::Reply(reply)))
            .map_err(|_| MailboxError::ConnectionLost)
    }

    fn submit(
        &self,
        target: ActorId,
        verb: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<(u32, tokio::sync::oneshot::Receiver<ReplyOutcome>), MailboxError> {
        if self.state().is_closing() {
            return Err(MailboxError::NotReady);
        }
        let (id, rx) = self.pending.register();
        let request = Request {
            id,
            command: verb.to_owned(),
            sender: self.aid,
            target,
            ack: true,
            args,
            kwargs,
        };
        match self
            .outbound
            .send(Outbound::Message(MailboxMessage::Request(request)))
        {
            Ok(()) => Ok((id, rx)),
            Err(_) => {
                self.pending.cancel(id);
                Err(MailboxError::ConnectionLost)
            }
        }
    }
}

impl std::fmt::Debug for MailboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxClient")
            .field("aid", &self.aid)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

async fn write_loop(mut sink: WireSink, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            Outbound::Message(message) => {
                if let Err(error) = sink.send(message).await {
                    warn!(%error, "mailbox write failed");
                    break;
                }
            }
            Outbound::Flush(done) => {
                let _ = sink.flush().await;
                let _ = done.send(());
            }
        }
    }
    // All senders gone or the wire broke: shut the write side down.
    let _ = sink.close().await;
}

async fn read_loop(
    mut wire: WireStream,
    pending: Arc<PendingRequests>,
    state: Arc<Mutex<MailboxState>>,
    inbound_tx: mpsc::UnboundedSender<InboundRequest>,
) {
    loop {
        match wire.next().await {
            Some(Ok(MailboxMessage::Reply(reply))) => {
                let outcome = reply.result.map_err(MailboxError::Remote);
                if !pending.resolve(reply.id, outcome) {
                    debug!(id = reply.id, "reply for unknown request dropped");
                }
            }
            Some(Ok(MailboxMessage::Request(request))) => {
                if inbound_tx.send(request).is_err() {
                    // The actor stopped consuming; keep draining replies.
                    debug!("inbound request dropped, actor loop gone");
                }
            }
            Some(Err(error)) => {
                warn!(%error, "mailbox wire error");
                break;
            }
            None => break,
        }
    }
    state.lock().advance_to(MailboxState::Closed);
    pending.fail_all(&MailboxError::ConnectionLost);
    // Dropping inbound_tx ends the actor's request stream.
}
