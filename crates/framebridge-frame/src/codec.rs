use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "FB" (0x46 0x42).
pub const MAGIC: [u8; 2] = [0x46, 0x42];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One opaque unit of application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes this frame occupies on the wire (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// Encode one payload into `dst`.
///
/// ```text
/// ┌──────────────┬────────────┬──────────────────┐
/// │ Magic (2B)   │ Length     │ Payload          │
/// │ 0x46 0x42    │ (4B LE)    │ (Length bytes)   │
/// └──────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` until a complete frame is buffered. On bad magic the
/// bytes before the next magic candidate are discarded and
/// `InvalidMagic` is returned, so the next call resumes on a plausible
/// frame boundary.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < MAGIC.len() {
        return Ok(None);
    }

    if src[..2] != MAGIC {
        let skip = resync_offset(src);
        src.advance(skip);
        return Err(FrameError::InvalidMagic);
    }

    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        // Skip the header so a hostile length cannot wedge the stream.
        src.advance(HEADER_SIZE);
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { payload }))
}

/// Offset of the next possible frame start after position 0.
fn resync_offset(src: &[u8]) -> usize {
    src[1..]
        .iter()
        .enumerate()
        .find_map(|(i, &b)| {
            let at = i + 1;
            let next = src.get(at + 1).copied();
            (b == MAGIC[0] && next.is_none_or(|n| n == MAGIC[1])).then_some(at)
        })
        .unwrap_or(src.len())
}

/// Configuration for framed streams.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for the blocking read side. `None` blocks until data or close.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for the blocking write side.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
