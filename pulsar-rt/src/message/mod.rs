//! Wire model for the mailbox protocol.
//!
//! Three layers, bottom up: [`Value`] is the closed self-describing binary
//! value the runtime ships between actors; [`FrameCodec`] is the unmasked
//! WebSocket-style framing every mailbox connection speaks; [`MailboxMessage`]
//! is the request/reply envelope carried inside each frame.

pub mod envelope;
pub mod error;
pub mod frame;
pub mod value;

pub use envelope::{MailboxMessage, MessageCodec, Reply, Request, REPLY_TAG, REQUEST_TAG};
pub use error::CodecError;
pub use frame::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use value::Value;
