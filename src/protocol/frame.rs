//! Frame codec
//!
//! Every message on the wire is a fixed eight byte header followed by the
//! payload:
//!
//! ```text
//! +----------------+----------------+-----------------+
//! | data_len (LE)  | msg_id (LE)    | payload         |
//! | u32            | u32            | data_len bytes  |
//! +----------------+----------------+-----------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::packets::Packet;

/// Size of the frame header in bytes
pub const FRAME_HEADER_LEN: usize = 8;

/// A single framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from a raw id and payload
    pub fn new(msg_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            payload: payload.into(),
        }
    }

    /// Build a frame from a typed packet
    pub fn from_packet<P: Packet>(packet: &P) -> Self {
        Self {
            msg_id: P::msg_id(),
            payload: packet.to_payload(),
        }
    }

    /// Encoded size including the header
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Append the encoded frame to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u32_le(self.payload.len() as u32);
        dst.put_u32_le(self.msg_id);
        dst.put_slice(&self.payload);
    }

    /// Encode into a standalone buffer
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst);
        dst.freeze()
    }
}

/// Header of a frame whose payload has not been read yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub data_len: u32,
    pub msg_id: u32,
}

impl FrameHeader {
    /// Parse a header from its eight raw bytes
    pub fn parse(raw: [u8; FRAME_HEADER_LEN]) -> Self {
        let mut raw = &raw[..];
        let data_len = raw.get_u32_le();
        let msg_id = raw.get_u32_le();
        Self { data_len, msg_id }
    }

    /// Reject payloads larger than `max_payload`
    pub fn check_size(&self, max_payload: usize) -> Result<(), ProtocolError> {
        let size = self.data_len as usize;
        if size > max_payload {
            return Err(ProtocolError::PacketTooLarge {
                size,
                max: max_payload,
            });
        }
        Ok(())
    }
}

/// Incremental decoder over a growing byte buffer
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_payload: usize,
}

impl FrameDecoder {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Split one complete frame off the front of `src`
    ///
    /// Returns `Ok(None)` when more bytes are needed. Nothing is consumed
    /// until a whole frame is available.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut raw = [0u8; FRAME_HEADER_LEN];
        raw.copy_from_slice(&src[..FRAME_HEADER_LEN]);
        let header = FrameHeader::parse(raw);
        header.check_size(self.max_payload)?;

        let total = FRAME_HEADER_LEN + header.data_len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let payload = src.split_to(header.data_len as usize).freeze();
        Ok(Some(Frame {
            msg_id: header.msg_id,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packets::SyncPidPacket;

    #[test]
    fn test_header_layout() {
        let frame = Frame::new(202, vec![0xAA, 0xBB, 0xCC]);
        let encoded = frame.encode();

        assert_eq!(
            &encoded[..],
            &[3, 0, 0, 0, 202, 0, 0, 0, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn test_from_packet() {
        let frame = Frame::from_packet(&SyncPidPacket { pid: 1 });
        assert_eq!(frame.msg_id, 1);
        assert_eq!(&frame.payload[..], &1i32.to_le_bytes());
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let decoder = FrameDecoder::new(64);
        let encoded = Frame::new(3, vec![1, 2, 3, 4]).encode();

        let mut src = BytesMut::from(&encoded[..5]);
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert_eq!(src.len(), 5);

        src.extend_from_slice(&encoded[5..]);
        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.msg_id, 3);
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4]);
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let decoder = FrameDecoder::new(64);
        let mut src = BytesMut::new();
        Frame::new(2, vec![9]).encode_into(&mut src);
        Frame::new(3, Vec::new()).encode_into(&mut src);

        assert_eq!(decoder.decode(&mut src).unwrap().unwrap().msg_id, 2);
        let empty = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(empty.msg_id, 3);
        assert!(empty.payload.is_empty());
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let decoder = FrameDecoder::new(16);
        let mut src = BytesMut::new();
        src.put_u32_le(17);
        src.put_u32_le(2);

        assert_eq!(
            decoder.decode(&mut src),
            Err(ProtocolError::PacketTooLarge { size: 17, max: 16 })
        );
    }
}
