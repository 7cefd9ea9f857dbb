//! Multi-part message framing and control header codec.
//!
//! A message is a sequence of parts. Every part is framed with:
//! - a 2-byte magic number ("TQ") for stream synchronization
//! - a 4-byte little-endian body length
//! - a 2-byte little-endian flag word whose bit 0 says another part follows
//!
//! The first part of a request or response is a length-prefixed control
//! header (see [`header`]); the optional second part is raw attachment bytes.

pub mod codec;
pub mod control;
pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_part, encode_part, Part, PartConfig, DEFAULT_MAX_PART_SIZE, FLAG_MORE,
    PART_HEADER_SIZE,
};
pub use control::{Crop, RequestHeader, ResponseHeader, TransformParams, DEFAULT_SCALE};
pub use error::{FrameError, HeaderError, Result};
pub use header::{
    check_payload_length, decode_header, encode_header, join_single, split_single,
    LENGTH_PREFIX_SIZE, MAX_HEADER_LEN,
};
pub use reader::PartReader;
pub use writer::PartWriter;
