//! Unmasked WebSocket-style framing.
//!
//! Mailbox messages travel as final data frames with the standard 2-byte
//! minimum header and 126/127 extended lengths. Frames are never masked:
//! both endpoints are trusted runtime processes, so the client-masking rule
//! of the public framing discipline does not apply. A masked or otherwise
//! malformed frame is a protocol violation and the connection is closed.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

// Layer 3: Internal module imports
use super::error::CodecError;

/// First header byte of every mailbox frame: FIN + data opcode 1.
const FRAME_HEADER: u8 = 0x81;

/// Mask bit in the second header byte; must be clear.
const MASK_BIT: u8 = 0x80;

/// Default cap on a single frame's payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame codec for mailbox connections.
///
/// Implements [`Decoder`]/[`Encoder`] so it can drive a `Framed` transport
/// directly, and can equally be fed by hand from a protocol's receive
/// buffer.
///
/// # Example
/// ```rust
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
/// use pulsar_rt::message::FrameCodec;
///
/// let mut codec = FrameCodec::default();
/// let mut buf = BytesMut::new();
/// codec.encode(bytes::Bytes::from_static(b"ping"), &mut buf).unwrap();
///
/// let payload = codec.decode(&mut buf).unwrap().unwrap();
/// assert_eq!(&payload[..], b"ping");
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with an explicit payload cap.
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// The configured payload cap.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let first = src[0];
        if first != FRAME_HEADER {
            return Err(CodecError::InvalidHeader(first));
        }
        let second = src[1];
        if second & MASK_BIT != 0 {
            return Err(CodecError::MaskedFrame);
        }

        let (header_len, payload_len) = match second & 0x7f {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (4, u16::from_be_bytes([src[2], src[3]]) as usize)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut len_bytes = [0u8; 8];
                len_bytes.copy_from_slice(&src[2..10]);
                let len = u64::from_be_bytes(len_bytes);
                if len > self.max_frame_size as u64 {
                    return Err(CodecError::FrameTooLarge {
                        len: len.min(usize::MAX as u64) as usize,
                        max: self.max_frame_size,
                    });
                }
                (10, len as usize)
            }
            short => (2, short as usize),
        };

        if payload_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                len: payload_len,
                max: self.max_frame_size,
            });
        }

        if src.len() < header_len + payload_len {
            src.reserve(header_len + payload_len - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        Ok(Some(src.split_to(payload_len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), CodecError> {
        if payload.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(payload.len() + 10);
        dst.put_u8(FRAME_HEADER);
        match payload.len() {
            len if len < 126 => dst.put_u8(len as u8),
            len if len <= u16::MAX as usize => {
                dst.put_u8(126);
                dst.put_u16(len as u16);
            }
            len => {
                dst.put_u8(127);
                dst.put_u64(len as u64);
            }
        }
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &mut FrameCodec, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::copy_from_slice(payload), &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn test_short_frame_roundtrip() {
        let mut codec = FrameCodec::default();
        let mut buf = encode(&mut codec, b"hello");

        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 5);

        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extended_16bit_length() {
        let mut codec = FrameCodec::default();
        let body = vec![0xaa; 300];
        let mut buf = encode(&mut codec, &body);

        assert_eq!(buf[1], 126);
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload.len(), 300);
    }

    #[test]
    fn test_extended_64bit_length() {
        let mut codec = FrameCodec::default();
        let body = vec![0xbb; 70_000];
        let mut buf = encode(&mut codec, &body);

        assert_eq!(buf[1], 127);
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload.len(), 70_000);
    }

    #[test]
    fn test_partial_frames_wait_for_more() {
        let mut codec = FrameCodec::default();
        let full = encode(&mut codec, b"abcdef");

        let mut partial = BytesMut::from(&full[..1]);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);

        let mut partial = BytesMut::from(&full[..4]);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);

        let mut complete = BytesMut::from(&full[..]);
        assert!(codec.decode(&mut complete).unwrap().is_some());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = FrameCodec::default();
        let mut buf = encode(&mut codec, b"one");
        buf.extend_from_slice(&encode(&mut codec, b"two"));

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"two");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_masked_frame_rejected() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0x81u8, 0x85, 1, 2, 3, 4, 0][..]);

        assert_eq!(codec.decode(&mut buf), Err(CodecError::MaskedFrame));
    }

    #[test]
    fn test_wrong_opcode_rejected() {
        let mut codec = FrameCodec::default();
        // Text frame without FIN bit.
        let mut buf = BytesMut::from(&[0x01u8, 0x02, b'h', b'i'][..]);

        assert_eq!(codec.decode(&mut buf), Err(CodecError::InvalidHeader(0x01)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::from(&[0x81u8, 20][..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::FrameTooLarge { len: 20, max: 16 })
        ));
    }

    #[test]
    fn test_oversized_encode_rejected() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        let result = codec.encode(Bytes::from_static(b"too long"), &mut buf);

        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_empty_payload() {
        let mut codec = FrameCodec::default();
        let mut buf = encode(&mut codec, b"");

        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert!(payload.is_empty());
    }
}
