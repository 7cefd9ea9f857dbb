use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Part header: magic (2) + length (4) + flags (2) = 8 bytes.
pub const PART_HEADER_SIZE: usize = 8;

/// Magic bytes: "TQ" (0x54 0x51).
pub const MAGIC: [u8; 2] = [0x54, 0x51];

/// Flag bit: another part of the same message follows this one.
pub const FLAG_MORE: u16 = 0x0001;

/// Default maximum part size: 16 MiB.
pub const DEFAULT_MAX_PART_SIZE: usize = 16 * 1024 * 1024;

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Whether another part of the same message follows.
    pub more: bool,
    /// The part body.
    pub payload: Bytes,
}

impl Part {
    /// Create a new part.
    pub fn new(payload: impl Into<Bytes>, more: bool) -> Self {
        Self {
            more,
            payload: payload.into(),
        }
    }

    /// The total wire size of this part (header + payload).
    pub fn wire_size(&self) -> usize {
        PART_HEADER_SIZE + self.payload.len()
    }
}

/// Encode one part into the wire format.
///
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Flags    │ Payload          │
/// │ 0x54 0x51    │ (4B LE)   │ (2B LE)  │ (Length bytes)   │
/// │ "TQ"         │           │ bit0=MORE│                  │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_part(payload: &[u8], more: bool, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PartTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(PART_HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_u16_le(if more { FLAG_MORE } else { 0 });
    dst.put_slice(payload);
    Ok(())
}

/// Decode one part from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete part yet. The
/// size limit is checked from the header alone, before waiting for the body.
pub fn decode_part(src: &mut BytesMut, max_part_size: usize) -> Result<Option<Part>> {
    if src.len() < PART_HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let flags = u16::from_le_bytes([src[6], src[7]]);

    if flags & !FLAG_MORE != 0 {
        return Err(FrameError::ReservedFlags(flags));
    }
    if len > max_part_size {
        return Err(FrameError::PartTooLarge {
            size: len,
            max: max_part_size,
        });
    }

    if src.len() < PART_HEADER_SIZE + len {
        return Ok(None);
    }

    src.advance(PART_HEADER_SIZE);
    let payload = src.split_to(len).freeze();

    Ok(Some(Part {
        more: flags & FLAG_MORE != 0,
        payload,
    }))
}

/// Configuration for part readers and writers.
#[derive(Debug, Clone)]
pub struct PartConfig {
    /// Maximum part size in bytes. Default: 16 MiB.
    pub max_part_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for PartConfig {
    fn default() -> Self {
        Self {
            max_part_size: DEFAULT_MAX_PART_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
