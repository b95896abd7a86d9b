//! Framing for transports that are a single undifferentiated byte stream.
//!
//! Every frame is `tag: u8 | len: u32 (big-endian) | payload`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::transport::Frame;

/// Raw terminal bytes.
pub const TAG_DATA: u8 = 0x00;
/// Encoded control message.
pub const TAG_CONTROL: u8 = 0x01;

const HEADER_LEN: usize = 5;

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    /// `max_frame_len` is capped at what the 32-bit length field can carry.
    pub fn new(max_frame_len: usize) -> Self {
        let cap = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
        Self {
            max_frame_len: max_frame_len.min(cap),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let tag = src[0];
        if tag != TAG_DATA && tag != TAG_CONTROL {
            return Err(ProtocolError::UnknownTag(tag));
        }

        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).to_vec();
        Ok(Some(match tag {
            TAG_CONTROL => Frame::Control(payload),
            _ => Frame::Data(payload),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let (tag, payload) = match frame {
            Frame::Data(payload) => (TAG_DATA, payload),
            Frame::Control(payload) => (TAG_CONTROL, payload),
            // A byte stream closes by shutting down its write half.
            Frame::Close => return Ok(()),
        };

        if payload.len() > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u8(tag);
        // Bounded by `max_frame_len`, which never exceeds `u32::MAX`.
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
