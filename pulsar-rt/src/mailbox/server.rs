//! Arbiter-side mailbox wiring.
//!
//! The mailbox server is an ordinary [`Server`](crate::protocol::Server)
//! whose producer decodes mailbox frames and forwards everything that
//! happens on its connections (opened, message, lost) to the arbiter's
//! event loop as [`ConnectionEvent`]s. Connections are keyed by peer
//! address until the handshake binds them to an actor id.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

// Layer 3: Internal module imports
use crate::events::{EventError, EventHub};
use crate::message::{MailboxMessage, MessageCodec};
use crate::protocol::{
    consumer_events, ProtocolConsumer, ProtocolError, ProtocolProducer, TimeTracker, Transport,
    CONNECTION_LOST, CONNECTION_MADE,
};

/// What the mailbox server reports to its owner about one connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A new connection was accepted; `transport` is its write side.
    Opened {
        peer: SocketAddr,
        transport: Transport,
    },
    /// A complete message arrived on the connection.
    Message {
        peer: SocketAddr,
        message: MailboxMessage,
    },
    /// The connection went away.
    Lost {
        peer: SocketAddr,
        error: Option<EventError>,
    },
}

/// Build the producer behind the arbiter's mailbox server.
///
/// Every connection event is pushed into `sink`; the arbiter's loop does
/// the routing.
pub fn mailbox_producer(
    time: TimeTracker,
    sink: mpsc::UnboundedSender<ConnectionEvent>,
    max_frame_size: usize,
) -> ProtocolProducer {
    let consumer_sink = sink.clone();
    let factory = Arc::new(move |transport: Transport| {
        Box::new(MailboxConsumer::new(
            transport.peer(),
            consumer_sink.clone(),
            max_frame_size,
        )) as Box<dyn ProtocolConsumer>
    });

    let hook_sink = sink;
    let hook = Arc::new(move |protocol: &mut crate::protocol::Protocol| {
        let peer = protocol.transport().peer();
        let transport = protocol.transport().clone();

        let opened = hook_sink.clone();
        let _ = protocol.events().bind(CONNECTION_MADE, move |_, _| {
            let _ = opened.send(ConnectionEvent::Opened {
                peer,
                transport: transport.clone(),
            });
            Ok(())
        });

        let lost = hook_sink.clone();
        let _ = protocol.events().bind(CONNECTION_LOST, move |_, exc| {
            let _ = lost.send(ConnectionEvent::Lost {
                peer,
                error: exc.cloned(),
            });
            Ok(())
        });
    });

    ProtocolProducer::new(time, factory).with_connection_hook(hook)
}

/// Decodes exactly one mailbox message, then finishes its exchange.
///
/// Partial frames stay buffered inside the consumer; pipelined bytes
/// after a complete message come back as the unprocessed tail for the
/// next consumer.
struct MailboxConsumer {
    events: EventHub,
    peer: SocketAddr,
    codec: MessageCodec,
    buffer: BytesMut,
    sink: mpsc::UnboundedSender<ConnectionEvent>,
    done: bool,
}

impl MailboxConsumer {
    fn new(
        peer: SocketAddr,
        sink: mpsc::UnboundedSender<ConnectionEvent>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            events: consumer_events(),
            peer,
            codec: MessageCodec::new(max_frame_size),
            buffer: BytesMut::new(),
            sink,
            done: false,
        }
    }
}

impl ProtocolConsumer for MailboxConsumer {
    fn events(&self) -> &EventHub {
        &self.events
    }

    fn feed_data(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        self.buffer.extend_from_slice(data);
        match self.codec.decode(&mut self.buffer)? {
            Some(message) => {
                let _ = self.sink.send(ConnectionEvent::Message {
                    peer: self.peer,
                    message,
                });
                self.done = true;
                Ok(self.buffer.split().to_vec())
            }
            None => Ok(Vec::new()),
        }
    }

    fn finished(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command;
    use crate::message::{Reply, Request, Value};
    use crate::protocol::Server;
    use crate::util::ActorId;
    use futures::{SinkExt, StreamExt};
    use std::collections::BTreeMap;
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    const MAX_FRAME: usize = 1 << 20;

    fn ping_request(sender: ActorId, target: ActorId) -> MailboxMessage {
        MailboxMessage::Request(Request {
            id: 1,
            command: command::PING.to_owned(),
            sender,
            target,
            ack: true,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        })
    }

    #[tokio::test]
    async fn test_connection_events_flow() {
        let (sink, mut events) = mpsc::unbounded_channel();
        let producer = mailbox_producer(TimeTracker::start(), sink, MAX_FRAME);
        let server = Server::bind("mailbox", "127.0.0.1:0".parse().unwrap(), producer)
            .await
            .unwrap();

        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut framed = Framed::new(stream, MessageCodec::new(MAX_FRAME));

        let opened = events.recv().await.unwrap();
        let peer = match opened {
            ConnectionEvent::Opened { peer, .. } => peer,
            other => panic!("expected Opened, got {other:?}"),
        };

        let sender = ActorId::new();
        let target = ActorId::new();
        framed.send(ping_request(sender, target)).await.unwrap();

        match events.recv().await.unwrap() {
            ConnectionEvent::Message { peer: from, message } => {
                assert_eq!(from, peer);
                match message {
                    MailboxMessage::Request(request) => {
                        assert_eq!(request.command, command::PING);
                        assert_eq!(request.sender, sender);
                    }
                    other => panic!("expected request, got {other:?}"),
                }
            }
            other => panic!("expected Message, got {other:?}"),
        }

        drop(framed);
        match events.recv().await.unwrap() {
            ConnectionEvent::Lost { peer: from, .. } => assert_eq!(from, peer),
            other => panic!("expected Lost, got {other:?}"),
        }

        server.close().await;
    }

    #[tokio::test]
    async fn test_replies_written_through_transport() {
        let (sink, mut events) = mpsc::unbounded_channel();
        let producer = mailbox_producer(TimeTracker::start(), sink, MAX_FRAME);
        let server = Server::bind("mailbox", "127.0.0.1:0".parse().unwrap(), producer)
            .await
            .unwrap();

        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut framed = Framed::new(stream, MessageCodec::new(MAX_FRAME));

        let transport = match events.recv().await.unwrap() {
            ConnectionEvent::Opened { transport, .. } => transport,
            other => panic!("expected Opened, got {other:?}"),
        };

        framed
            .send(ping_request(ActorId::new(), ActorId::new()))
            .await
            .unwrap();
        let _ = events.recv().await.unwrap();

        // Answer through the transport the way the arbiter does.
        let reply = MailboxMessage::Reply(Reply::ok(1, Value::from("pong")));
        let mut out = BytesMut::new();
        tokio_util::codec::Encoder::encode(
            &mut MessageCodec::new(MAX_FRAME),
            reply.clone(),
            &mut out,
        )
        .unwrap();
        transport.write(out.freeze()).unwrap();

        let received = framed.next().await.unwrap().unwrap();
        assert_eq!(received, reply);

        server.close().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_connection() {
        let (sink, mut events) = mpsc::unbounded_channel();
        let producer = mailbox_producer(TimeTracker::start(), sink, MAX_FRAME);
        let server = Server::bind("mailbox", "127.0.0.1:0".parse().unwrap(), producer)
            .await
            .unwrap();

        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let _ = events.recv().await.unwrap(); // Opened

        // Not a valid frame header.
        use tokio::io::AsyncWriteExt;
        let mut stream = stream;
        stream.write_all(&[0x00, 0x00, 0x00]).await.unwrap();

        match events.recv().await.unwrap() {
            ConnectionEvent::Lost { error, .. } => assert!(error.is_some()),
            other => panic!("expected Lost, got {other:?}"),
        }

        server.close().await;
    }

    #[tokio::test]
    async fn test_pipelined_messages_arrive_in_order() {
        let (sink, mut events) = mpsc::unbounded_channel();
        let producer = mailbox_producer(TimeTracker::start(), sink, MAX_FRAME);
        let server = Server::bind("mailbox", "127.0.0.1:0".parse().unwrap(), producer)
            .await
            .unwrap();

        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut framed = Framed::new(stream, MessageCodec::new(MAX_FRAME));
        let _ = events.recv().await.unwrap(); // Opened

        let sender = ActorId::new();
        let target = ActorId::new();
        for (id, payload) in [(1u32, "1"), (2, "2"), (3, "3")] {
            framed
                .send(MailboxMessage::Request(Request {
                    id,
                    command: command::ECHO.to_owned(),
                    sender,
                    target,
                    ack: true,
                    args: vec![Value::from(payload)],
                    kwargs: BTreeMap::new(),
                }))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            match events.recv().await.unwrap() {
                ConnectionEvent::Message { message, .. } => seen.push(message.id()),
                other => panic!("expected Message, got {other:?}"),
            }
        }
        assert_eq!(seen, vec![1, 2, 3]);

        server.close().await;
    }
}
