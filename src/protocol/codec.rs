//! Frame format (§4.1):
//!
//! ```text
//! +---------+-------------------+------------------+
//! | tag:u8  | length:u32 little | payload [length] |
//! +---------+-------------------+------------------+
//! ```
//!
//! The decoder is incremental: it is fed arbitrarily-sized chunks and
//! returns the next complete frame once enough bytes have accumulated,
//! advancing its internal buffer past the consumed bytes each time.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Maximum payload size accepted by the decoder (16 MiB).
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Input = 0,
    Output = 1,
    Resize = 2,
    Init = 3,
    Detach = 4,
    DetachAll = 5,
    Kill = 6,
    Info = 7,
}

impl Tag {
    pub fn from_u8(byte: u8) -> Option<Tag> {
        match byte {
            0 => Some(Tag::Input),
            1 => Some(Tag::Output),
            2 => Some(Tag::Resize),
            3 => Some(Tag::Init),
            4 => Some(Tag::Detach),
            5 => Some(Tag::DetachAll),
            6 => Some(Tag::Kill),
            7 => Some(Tag::Info),
            _ => None,
        }
    }
}

/// A decoded frame. `tag` is the raw byte: unknown tags are preserved
/// rather than rejected, so callers can log-and-ignore per §4.1's
/// forward-compatibility rule.
#[derive(Debug, Clone)]
pub struct Frame {
    pub tag: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(tag: Tag, payload: impl Into<Bytes>) -> Self {
        Frame {
            tag: tag as u8,
            payload: payload.into(),
        }
    }

    pub fn known_tag(&self) -> Option<Tag> {
        Tag::from_u8(self.tag)
    }

    /// Serialize this frame's header + payload into `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.tag);
        out.put_u32_le(self.payload.len() as u32);
        out.put_slice(&self.payload);
    }
}

/// Encode a single frame into a freshly allocated buffer. Convenience
/// wrapper around [`Frame::encode`] for one-shot sends (probe requests).
pub fn encode(tag: Tag, payload: impl Into<Bytes>) -> BytesMut {
    let frame = Frame::new(tag, payload);
    let mut out = BytesMut::with_capacity(HEADER_LEN + frame.payload.len());
    frame.encode(&mut out);
    out
}

/// Incremental frame decoder over a growing byte buffer.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            buf: BytesMut::new(),
        }
    }

    /// Append newly-read bytes to the decode buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempt to decode the next complete frame. Returns `Ok(None)` if
    /// more bytes are needed. Advances the buffer past the consumed frame
    /// on success.
    pub fn decode(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let tag = self.buf[0];
        let len = u32::from_le_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                cap: MAX_PAYLOAD_LEN,
            });
        }
        let total = HEADER_LEN + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len as usize).freeze();
        Ok(Some(Frame { tag, payload }))
    }
}

/// `{rows:u16, cols:u16}` little-endian, shared by `Resize` and `Init`.
pub fn encode_size(rows: u16, cols: u16) -> Bytes {
    let mut b = BytesMut::with_capacity(4);
    b.put_u16_le(rows);
    b.put_u16_le(cols);
    b.freeze()
}

pub fn decode_size(payload: &[u8]) -> Result<(u16, u16), ProtocolError> {
    if payload.len() < 4 {
        return Err(ProtocolError::Truncated {
            have: payload.len(),
            need: 4,
        });
    }
    let rows = u16::from_le_bytes([payload[0], payload[1]]);
    let cols = u16::from_le_bytes([payload[2], payload[3]]);
    Ok((rows, cols))
}

/// `{clients_len:u32, pid:i32}` little-endian, the `Info` response payload.
pub fn encode_info(clients_len: u32, pid: i32) -> Bytes {
    let mut b = BytesMut::with_capacity(8);
    b.put_u32_le(clients_len);
    b.put_i32_le(pid);
    b.freeze()
}

pub fn decode_info(payload: &[u8]) -> Result<(u32, i32), ProtocolError> {
    if payload.len() < 8 {
        return Err(ProtocolError::Truncated {
            have: payload.len(),
            need: 8,
        });
    }
    let clients_len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let pid = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    Ok((clients_len, pid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_frame() {
        let mut out = BytesMut::new();
        Frame::new(Tag::Input, Bytes::from_static(b"hello")).encode(&mut out);

        let mut dec = Decoder::new();
        dec.feed(&out);
        let frame = dec.decode().unwrap().unwrap();
        assert_eq!(frame.tag, Tag::Input as u8);
        assert_eq!(&frame.payload[..], b"hello");
        assert!(dec.decode().unwrap().is_none());
    }

    #[test]
    fn decodes_across_arbitrary_chunk_boundaries() {
        let mut out = BytesMut::new();
        Frame::new(Tag::Output, Bytes::from_static(b"0123456789")).encode(&mut out);
        let bytes = out.to_vec();

        for split in [1usize, 2, HEADER_LEN, HEADER_LEN + 1, bytes.len() - 1] {
            let split = split.min(bytes.len());
            let mut dec = Decoder::new();
            dec.feed(&bytes[..split]);
            assert!(dec.decode().unwrap().is_none() || split == bytes.len());
            dec.feed(&bytes[split..]);
            let frame = dec.decode().unwrap().expect("frame should now be complete");
            assert_eq!(&frame.payload[..], b"0123456789");
        }
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut out = BytesMut::new();
        out.put_u8(Tag::Input as u8);
        out.put_u32_le(MAX_PAYLOAD_LEN + 1);
        let mut dec = Decoder::new();
        dec.feed(&out);
        match dec.decode() {
            Err(ProtocolError::PayloadTooLarge { .. }) => {}
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_preserved_not_rejected() {
        let mut out = BytesMut::new();
        Frame::new_raw(200, Bytes::new()).encode(&mut out);
        let mut dec = Decoder::new();
        dec.feed(&out);
        let frame = dec.decode().unwrap().unwrap();
        assert!(frame.known_tag().is_none());
    }
}

impl Frame {
    #[cfg(test)]
    fn new_raw(tag: u8, payload: Bytes) -> Self {
        Frame { tag, payload }
    }
}
