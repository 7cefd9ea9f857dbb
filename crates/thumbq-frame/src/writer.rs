use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use thumbq_transport::Connection;

use crate::codec::{encode_part, PartConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete message parts to any `Write` stream.
pub struct PartWriter<T> {
    inner: T,
    buf: BytesMut,
    config: PartConfig,
}

impl<T: Write> PartWriter<T> {
    /// Create a new part writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PartConfig::default())
    }

    /// Create a new part writer with explicit configuration.
    pub fn with_config(inner: T, config: PartConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one part, flagging whether another part follows.
    ///
    /// Writes interrupted by a signal are retried; a timed-out write
    /// (`WouldBlock`/`TimedOut`) is reported as an I/O error.
    pub fn send_part(&mut self, payload: &[u8], more: bool) -> Result<()> {
        if payload.len() > self.config.max_part_size {
            return Err(FrameError::PartTooLarge {
                size: payload.len(),
                max: self.config.max_part_size,
            });
        }

        self.buf.clear();
        encode_part(payload, more, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl PartWriter<Connection> {
    /// Create a part writer for a connection and apply the write timeout.
    pub fn with_config_conn(inner: Connection, config: PartConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
