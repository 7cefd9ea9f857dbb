use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use thumbq_transport::Connection;
use tracing::debug;

use crate::codec::{decode_part, Part, PartConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete message parts from any `Read` stream.
///
/// Partial reads are reassembled internally and reads interrupted by a
/// signal are retried, so callers only ever see whole parts.
pub struct PartReader<T> {
    inner: T,
    buf: BytesMut,
    config: PartConfig,
}

impl<T: Read> PartReader<T> {
    /// Create a new part reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PartConfig::default())
    }

    /// Create a new part reader with explicit configuration.
    pub fn with_config(inner: T, config: PartConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete part (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF at a part boundary
    /// and `Err(FrameError::Truncated)` on EOF inside a part.
    pub fn read_part(&mut self) -> Result<Part> {
        loop {
            if let Some(part) = self.buffered_part()? {
                return Ok(part);
            }
            if self.fill()? == 0 {
                return Err(self.eof_error());
            }
        }
    }

    /// Decode the next part from bytes already read, without touching the
    /// stream.
    pub fn buffered_part(&mut self) -> Result<Option<Part>> {
        decode_part(&mut self.buf, self.config.max_part_size).inspect_err(|err| {
            debug!(error = %err, buffered = self.buf.len(), "rejected part header");
        })
    }

    /// Perform one read from the stream into the buffer. Returns the number
    /// of bytes read; `0` means the peer closed the stream.
    pub fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(read) => {
                    self.buf.extend_from_slice(&chunk[..read]);
                    return Ok(read);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// The error describing EOF at the current position.
    pub fn eof_error(&self) -> FrameError {
        if self.buf.is_empty() {
            return FrameError::ConnectionClosed;
        }
        debug!(buffered = self.buf.len(), "stream closed inside a part");
        FrameError::Truncated {
            buffered: self.buf.len(),
        }
    }

    /// Bytes of a not yet complete part held in the buffer.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl PartReader<Connection> {
    /// Create a part reader for a connection and apply the read timeout.
    pub fn with_config_conn(inner: Connection, config: PartConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: thumbq_transport::TransportError) -> FrameError {
    match err {
        thumbq_transport::TransportError::Io(io) => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
