//! Request/reply envelopes carried inside mailbox frames.
//!
//! Each frame holds exactly one message. Payload byte 0 is the message
//! tag, [`REQUEST_TAG`] or [`REPLY_TAG`], and the rest is one encoded
//! [`Value`] map with the envelope fields. Replies correlate to requests
//! by the sender-issued `id`; a request sent with `ack = false` expects
//! no reply at all.

// Layer 1: Standard library imports
use std::collections::BTreeMap;

// Layer 2: Third-party crate imports
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

// Layer 3: Internal module imports
use super::error::CodecError;
use super::frame::FrameCodec;
use super::value::Value;
use crate::util::ActorId;

/// Payload tag of a request message.
pub const REQUEST_TAG: u8 = 0x01;

/// Payload tag of a reply message.
pub const REPLY_TAG: u8 = 0x02;

/// A command request addressed to one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Sender-issued correlation id, unique per sender connection
    pub id: u32,
    /// Registered command verb
    pub command: String,
    /// Identity of the sending actor
    pub sender: ActorId,
    /// Identity of the actor the command is addressed to
    pub target: ActorId,
    /// Whether the sender expects a reply
    pub ack: bool,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: BTreeMap<String, Value>,
}

/// A reply correlated to a prior request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// The id of the request this reply answers
    pub id: u32,
    /// Command result, or the error text the handler produced
    pub result: Result<Value, String>,
}

impl Reply {
    /// Build a success reply.
    pub fn ok(id: u32, result: Value) -> Self {
        Self {
            id,
            result: Ok(result),
        }
    }

    /// Build an error reply.
    pub fn err(id: u32, error: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(error.into()),
        }
    }
}

/// One complete mailbox message.
#[derive(Debug, Clone, PartialEq)]
pub enum MailboxMessage {
    /// A command request
    Request(Request),
    /// A reply to a prior request
    Reply(Reply),
}

impl MailboxMessage {
    /// Encode into a frame payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Self::Request(request) => {
                buf.extend_from_slice(&[REQUEST_TAG]);
                let mut fields = BTreeMap::new();
                fields.insert("id".to_owned(), Value::from(request.id));
                fields.insert("command".to_owned(), Value::from(request.command.clone()));
                fields.insert("sender".to_owned(), Value::from(request.sender.to_string()));
                fields.insert("target".to_owned(), Value::from(request.target.to_string()));
                fields.insert("ack".to_owned(), Value::from(request.ack));
                fields.insert("args".to_owned(), Value::List(request.args.clone()));
                fields.insert("kwargs".to_owned(), Value::Map(request.kwargs.clone()));
                Value::Map(fields).encode_into(&mut buf);
            }
            Self::Reply(reply) => {
                buf.extend_from_slice(&[REPLY_TAG]);
                let mut fields = BTreeMap::new();
                fields.insert("id".to_owned(), Value::from(reply.id));
                match &reply.result {
                    Ok(value) => {
                        fields.insert("ok".to_owned(), Value::Bool(true));
                        fields.insert("result".to_owned(), value.clone());
                    }
                    Err(error) => {
                        fields.insert("ok".to_owned(), Value::Bool(false));
                        fields.insert("result".to_owned(), Value::from(error.clone()));
                    }
                }
                Value::Map(fields).encode_into(&mut buf);
            }
        }
        buf.freeze()
    }

    /// Decode one message from a complete frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let (&tag, rest) = payload
            .split_first()
            .ok_or(CodecError::UnexpectedEof)?;
        let fields = match Value::decode(rest)? {
            Value::Map(fields) => fields,
            _ => {
                return Err(CodecError::WrongType {
                    field: "envelope",
                    expected: "map",
                })
            }
        };

        match tag {
            REQUEST_TAG => Ok(Self::Request(Request {
                id: field_id(&fields)?,
                command: field_str(&fields, "command")?,
                sender: field_actor_id(&fields, "sender")?,
                target: field_actor_id(&fields, "target")?,
                ack: field_bool(&fields, "ack")?,
                args: field_list(&fields, "args")?,
                kwargs: field_map(&fields, "kwargs")?,
            })),
            REPLY_TAG => {
                let id = field_id(&fields)?;
                let ok = field_bool(&fields, "ok")?;
                let result = fields
                    .get("result")
                    .cloned()
                    .ok_or(CodecError::MissingField("result"))?;
                let result = if ok {
                    Ok(result)
                } else {
                    Err(result
                        .as_str()
                        .ok_or(CodecError::WrongType {
                            field: "result",
                            expected: "string",
                        })?
                        .to_owned())
                };
                Ok(Self::Reply(Reply { id, result }))
            }
            other => Err(CodecError::UnknownMessageTag(other)),
        }
    }

    /// The correlation id of this message.
    pub fn id(&self) -> u32 {
        match self {
            Self::Request(request) => request.id,
            Self::Reply(reply) => reply.id,
        }
    }
}

fn field<'a>(
    fields: &'a BTreeMap<String, Value>,
    name: &'static str,
) -> Result<&'a Value, CodecError> {
    fields.get(name).ok_or(CodecError::MissingField(name))
}

fn field_id(fields: &BTreeMap<String, Value>) -> Result<u32, CodecError> {
    let raw = field(fields, "id")?.as_int().ok_or(CodecError::WrongType {
        field: "id",
        expected: "int",
    })?;
    u32::try_from(raw).map_err(|_| CodecError::IdOutOfRange(raw))
}

fn field_str(fields: &BTreeMap<String, Value>, name: &'static str) -> Result<String, CodecError> {
    Ok(field(fields, name)?
        .as_str()
        .ok_or(CodecError::WrongType {
            field: name,
            expected: "string",
        })?
        .to_owned())
}

fn field_bool(fields: &BTreeMap<String, Value>, name: &'static str) -> Result<bool, CodecError> {
    field(fields, name)?.as_bool().ok_or(CodecError::WrongType {
        field: name,
        expected: "bool",
    })
}

fn field_list(
    fields: &BTreeMap<String, Value>,
    name: &'static str,
) -> Result<Vec<Value>, CodecError> {
    match field(fields, name)? {
        Value::List(items) => Ok(items.clone()),
        _ => Err(CodecError::WrongType {
            field: name,
            expected: "list",
        }),
    }
}

fn field_map(
    fields: &BTreeMap<String, Value>,
    name: &'static str,
) -> Result<BTreeMap<String, Value>, CodecError> {
    match field(fields, name)? {
        Value::Map(entries) => Ok(entries.clone()),
        _ => Err(CodecError::WrongType {
            field: name,
            expected: "map",
        }),
    }
}

fn field_actor_id(
    fields: &BTreeMap<String, Value>,
    name: &'static str,
) -> Result<ActorId, CodecError> {
    field_str(fields, name)?
        .parse()
        .map_err(|_| CodecError::InvalidActorId(name))
}

/// Frame + envelope codec for mailbox connections.
///
/// Decodes complete frames into [`MailboxMessage`]s and encodes messages
/// into framed payloads, so a `Framed<TcpStream, MessageCodec>` speaks the
/// mailbox protocol directly.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    frames: FrameCodec,
}

impl MessageCodec {
    /// Create a codec with an explicit frame payload cap.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            frames: FrameCodec::new(max_frame_size),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = MailboxMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<MailboxMessage>, CodecError> {
        match self.frames.decode(src)? {
            Some(payload) => Ok(Some(MailboxMessage::decode(&payload)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<MailboxMessage> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: MailboxMessage, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.frames.encode(message.encode(), dst)
    }
}
