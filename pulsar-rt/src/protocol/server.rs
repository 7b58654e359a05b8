//! TCP accept loop and connection drivers.
//!
//! A [`Server`] owns a listening socket and wires every accepted
//! connection into a producer-created [`Protocol`](super::Protocol): a
//! read loop feeds inbound bytes to `data_received`, a writer task drains
//! the connection's [`Transport`] channel, and an idle sweep closes
//! connections past the producer's keep-alive.

// Layer 1: Standard library imports
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::ProtocolError;
use super::producer::ProtocolProducer;
use super::protocol::Protocol;
use crate::events::EventError;

/// Write side of one connection.
///
/// Cheap to clone; writes are queued in order and flushed by the
/// connection's writer task. Consumers hold a transport to send their
/// responses.
#[derive(Clone, Debug)]
pub struct Transport {
    peer: SocketAddr,
    writer: mpsc::UnboundedSender<Bytes>,
}

impl Transport {
    /// Create a transport and the receiving end its writer task drains.
    pub fn pipe(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (writer, rx) = mpsc::unbounded_channel();
        (Self { peer, writer }, rx)
    }

    /// Queue bytes for writing. Fails once the connection is gone.
    pub fn write(&self, payload: Bytes) -> Result<(), ProtocolError> {
        self.writer
            .send(payload)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Address of the remote endpoint.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// A named TCP server owned by an actor or by the arbiter.
#[derive(Debug)]
pub struct Server {
    name: String,
    local_addr: SocketAddr,
    producer: ProtocolProducer,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Bind and start accepting.
    pub async fn bind(
        name: impl Into<String>,
        addr: SocketAddr,
        producer: ProtocolProducer,
    ) -> io::Result<Self> {
        let name = name.into();
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        debug!(server = %name, addr = %local_addr, "server listening");
        let accept_producer = producer.clone();
        let accept_task = tokio::spawn(accept_loop(listener, accept_producer, shutdown_rx));

        Ok(Self {
            name,
            local_addr,
            producer,
            shutdown,
            accept_task,
        })
    }

    /// The server's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound address (the OS picks the port when given port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The protocol producer behind this server.
    pub fn producer(&self) -> &ProtocolProducer {
        &self.producer
    }

    /// Stop accepting and close every open connection.
    pub async fn close(self) {
        debug!(server = %self.name, "server closing");
        let _ = self.shutdown.send(true);
        let _ = self.accept_task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    producer: ProtocolProducer,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        let mut accept_shutdown = shutdown.clone();
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let protocol_producer = producer.clone();
                    let conn_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        drive_connection(stream, peer, protocol_producer, conn_shutdown).await;
                    });
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                }
            },
            _ = accept_shutdown.changed() => break,
        }
    }
}

/// Drive one accepted connection until EOF, error, idle timeout, or
/// server shutdown.
pub async fn drive_connection(
    stream: TcpStream,
    peer: SocketAddr,
    producer: ProtocolProducer,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let (transport, writer_rx) = Transport::pipe(peer);
    let mut protocol = producer.create_protocol(transport);
    protocol.connection_made();

    let (mut read_half, write_half) = stream.into_split();
    let writer_task = tokio::spawn(drain_writes(write_half, writer_rx));

    let keep_alive = producer.keep_alive();
    let sweep_period = keep_alive
        .map(|timeout| timeout.max(Duration::from_secs(2)) / 2)
        .unwrap_or(Duration::from_secs(3600));
    let mut idle_sweep = interval(sweep_period);
    idle_sweep.reset(); // first tick is one period from now, not immediate
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        tokio::select! {
            read = read_half.read_buf(&mut buf) => match read {
                Ok(0) => {
                    protocol.connection_lost(None);
                    break;
                }
                Ok(_) => {
                    let chunk = buf.split().freeze();
                    if let Err(error) = feed_protocol(&mut protocol, &chunk) {
                        warn!(peer = %peer, %error, "closing connection on protocol error");
                        protocol.connection_lost(Some(EventError::Failed(error.to_string())));
                        break;
                    }
                }
                Err(error) => {
                    protocol.connection_lost(Some(EventError::Failed(error.to_string())));
                    break;
                }
            },
            _ = idle_sweep.tick() => {
                if let Some(timeout) = keep_alive {
                    if protocol.idle_seconds() >= timeout.as_secs().max(1) {
                        debug!(peer = %peer, "closing idle connection");
                        protocol.connection_lost(None);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                protocol.connection_lost(None);
                break;
            }
        }
    }

    writer_task.abort();
}

fn feed_protocol(protocol: &mut Protocol, chunk: &[u8]) -> Result<(), ProtocolError> {
    match protocol.data_received(chunk) {
        Ok(()) => Ok(()),
        Err(error) if error.is_fatal() => Err(error),
        Err(_) => Ok(()),
    }
}

async fn drain_writes(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut writer_rx: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(payload) = writer_rx.recv().await {
        if write_half.write_all(&payload).await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
