/// Errors raised while reading or writing message parts.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The part header does not start with the expected magic.
    #[error("invalid part magic (expected 0x5451 \"TQ\")")]
    InvalidMagic,

    /// The part header sets flag bits this version does not define.
    #[error("reserved part flags set: {0:#06x}")]
    ReservedFlags(u16),

    /// The part exceeds the configured maximum size.
    #[error("part too large ({size} bytes, max {max})")]
    PartTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing parts.
    #[error("part I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection on a part boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer closed the connection in the middle of a part.
    #[error("connection closed mid-part ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors raised by the length-prefixed control header codec.
///
/// Each variant is a distinct framing failure class; callers that report
/// these out of process (the sandbox worker) map them to distinct codes.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// Fewer bytes than the 4-byte length prefix.
    #[error("control header too short ({len} bytes)")]
    TooShort { len: usize },

    /// The length prefix is zero or not below the sanity ceiling.
    #[error("invalid control header length {0}")]
    InvalidLength(u32),

    /// The length prefix points past the end of the buffer.
    #[error("control header length {declared} exceeds {available} available bytes")]
    Overrun { declared: usize, available: usize },

    /// The header region is not a valid control record.
    #[error("malformed control header: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The declared payload length differs from the attached byte count.
    #[error("declared payload length {declared} but {actual} bytes attached")]
    LengthMismatch { declared: u64, actual: usize },

    /// The control record could not be serialized.
    #[error("control header encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}
