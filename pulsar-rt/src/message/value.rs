//! Self-describing binary values.
//!
//! The mailbox serializer handles a small closed set of primitives and
//! containers; everything actors exchange is expressed as a [`Value`].
//! The encoding is an internal detail of the runtime (both endpoints are
//! always this crate) and is validated strictly on decode.
//!
//! # Wire layout
//!
//! Every value starts with a one-byte type tag:
//!
//! ```text
//! 0x00 null
//! 0x01 true
//! 0x02 false
//! 0x03 int     (i64, big endian)
//! 0x04 float   (f64, big endian bits)
//! 0x05 string  (u32 length + utf-8 bytes)
//! 0x06 bytes   (u32 length + raw bytes)
//! 0x07 list    (u32 count + values)
//! 0x08 map     (u32 count + (string value, value) pairs)
//! ```

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::{Buf, BufMut, BytesMut};

// Layer 3: Internal module imports
use super::error::CodecError;

const TAG_NULL: u8 = 0x00;
const TAG_TRUE: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_BYTES: u8 = 0x06;
const TAG_LIST: u8 = 0x07;
const TAG_MAP: u8 = 0x08;

/// Maximum container nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 32;

/// Maximum declared length (strings, byte strings, containers) accepted
/// by the decoder. Bounds allocation before the payload is inspected.
pub const MAX_LENGTH: usize = 1 << 26;

/// A dynamically typed value exchanged between actors.
///
/// Maps are string-keyed and ordered, so a given value has exactly one
/// encoding.
///
/// # Example
/// ```rust
/// use pulsar_rt::message::Value;
///
/// let v = Value::from("hello");
/// assert_eq!(v.as_str(), Some("hello"));
///
/// let roundtrip = Value::decode(&v.encode()).unwrap();
/// assert_eq!(v, roundtrip);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Raw byte string
    Bytes(Vec<u8>),
    /// Homogeneously encoded list (heterogeneous contents allowed)
    List(Vec<Value>),
    /// String-keyed map
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build an empty map value.
    pub fn map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Borrow as a string if this value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as an integer if this value is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow as a bool if this value is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as a float if this value is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow as a list if this value is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a map if this value is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// True when this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.to_vec()
    }

    /// Encode, appending to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Self::Null => buf.put_u8(TAG_NULL),
            Self::Bool(true) => buf.put_u8(TAG_TRUE),
            Self::Bool(false) => buf.put_u8(TAG_FALSE),
            Self::Int(i) => {
                buf.put_u8(TAG_INT);
                buf.put_i64(*i);
            }
            Self::Float(f) => {
                buf.put_u8(TAG_FLOAT);
                buf.put_f64(*f);
            }
            Self::Str(s) => {
                buf.put_u8(TAG_STRING);
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Self::Bytes(b) => {
                buf.put_u8(TAG_BYTES);
                buf.put_u32(b.len() as u32);
                buf.put_slice(b);
            }
            Self::List(items) => {
                buf.put_u8(TAG_LIST);
                buf.put_u32(items.len() as u32);
                for item in items {
                    item.encode_into(buf);
                }
            }
            Self::Map(entries) => {
                buf.put_u8(TAG_MAP);
                buf.put_u32(entries.len() as u32);
                for (key, value) in entries {
                    buf.put_u32(key.len() as u32);
                    buf.put_slice(key.as_bytes());
                    value.encode_into(buf);
                }
            }
        }
    }

    /// Decode a single value; the input must contain exactly one value.
    pub fn decode(input: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = input;
        let value = Self::decode_from(&mut cursor, 0)?;
        if cursor.has_remaining() {
            return Err(CodecError::TrailingBytes);
        }
        Ok(value)
    }

    /// Decode a single value from the front of `buf`, advancing it.
    pub fn decode_from(buf: &mut impl Buf, depth: usize) -> Result<Self, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::DepthExceeded(MAX_DEPTH));
        }
        if !buf.has_remaining() {
            return Err(CodecError::UnexpectedEof);
        }
        match buf.get_u8() {
            TAG_NULL => Ok(Self::Null),
            TAG_TRUE => Ok(Self::Bool(true)),
            TAG_FALSE => Ok(Self::Bool(false)),
            TAG_INT => {
                ensure_remaining(buf, 8)?;
                Ok(Self::Int(buf.get_i64()))
            }
            TAG_FLOAT => {
                ensure_remaining(buf, 8)?;
                Ok(Self::Float(buf.get_f64()))
            }
            TAG_STRING => {
                let len = read_length(buf)?;
                ensure_remaining(buf, len)?;
                let raw = buf.copy_to_bytes(len);
                let s = std::str::from_utf8(&raw)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_owned();
                Ok(Self::Str(s))
            }
            TAG_BYTES => {
                let len = read_length(buf)?;
                ensure_remaining(buf, len)?;
                Ok(Self::Bytes(buf.copy_to_bytes(len).to_vec()))
            }
            TAG_LIST => {
                let count = read_length(buf)?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(Self::decode_from(buf, depth + 1)?);
                }
                Ok(Self::List(items))
            }
            TAG_MAP => {
                let count = read_length(buf)?;
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key_len = read_length(buf)?;
                    ensure_remaining(buf, key_len)?;
                    let raw = buf.copy_to_bytes(key_len);
                    let key = std::str::from_utf8(&raw)
                        .map_err(|_| CodecError::InvalidUtf8)?
                        .to_owned();
                    let value = Self::decode_from(buf, depth + 1)?;
                    entries.insert(key, value);
                }
                Ok(Self::Map(entries))
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(())
}

fn read_length(buf: &mut impl Buf) -> Result<usize, CodecError> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_u32() as usize;
    if len > MAX_LENGTH {
        return Err(CodecError::LengthExceeded {
            len,
            max: MAX_LENGTH,
        });
    }
    Ok(len)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::List(items) => write!(f, "<list of {}>", items.len()),
            Self::Map(entries) => write!(f, "<map of {}>", entries.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}
