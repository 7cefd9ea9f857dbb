use std::hint::black_box;
use std::io::{ErrorKind, Read};

use crate::error::{Result, SandboxError};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Byte accumulator that zeroes its contents when released.
///
/// Growth goes through [`ScrubBuffer::reserve`], which scrubs the old
/// allocation before freeing it, so no stale copy of untrusted bytes is
/// left behind on the heap.
pub struct ScrubBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl ScrubBuffer {
    /// Buffer that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::with_limit(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Append bytes, failing without copying anything if the limit would
    /// be exceeded.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        let needed = self
            .data
            .len()
            .checked_add(bytes.len())
            .filter(|needed| *needed <= self.limit)
            .ok_or(SandboxError::OutputTooLarge { limit: self.limit })?;
        self.reserve(needed);
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Read `reader` to EOF, retrying interrupted reads.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let result = loop {
            match reader.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    if let Err(err) = self.extend(&chunk[..n]) {
                        break Err(err);
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(SandboxError::Io(err)),
            }
        };
        scrub(&mut chunk);
        result
    }

    fn reserve(&mut self, needed: usize) {
        if needed <= self.data.capacity() {
            return;
        }
        let capacity = needed
            .max(self.data.capacity().saturating_mul(2))
            .min(self.limit)
            .max(needed);
        let mut grown = Vec::with_capacity(capacity);
        grown.extend_from_slice(&self.data);
        let mut old = std::mem::replace(&mut self.data, grown);
        scrub(&mut old);
    }
}

impl From<Vec<u8>> for ScrubBuffer {
    /// Take ownership of `data`; it is scrubbed when the buffer goes away.
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            limit: usize::MAX,
        }
    }
}

impl Clone for ScrubBuffer {
    fn clone(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        data.extend_from_slice(&self.data);
        Self {
            data,
            limit: self.limit,
        }
    }
}

impl PartialEq for ScrubBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for ScrubBuffer {}

impl Drop for ScrubBuffer {
    fn drop(&mut self) {
        scrub(&mut self.data);
    }
}

impl std::fmt::Debug for ScrubBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrubBuffer")
            .field("len", &self.data.len())
            .field("limit", &self.limit)
            .finish()
    }
}

fn scrub(bytes: &mut [u8]) {
    bytes.fill(0);
    black_box(bytes);
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn accumulates_up_to_limit() {
        let mut buf = ScrubBuffer::with_limit(8);
        buf.extend(b"abcd").unwrap();
        buf.extend(b"efgh").unwrap();
        assert_eq!(buf.as_slice(), b"abcdefgh");

        let err = buf.extend(b"i").unwrap_err();
        assert!(matches!(err, SandboxError::OutputTooLarge { limit: 8 }));
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn reads_to_eof() {
        let payload = vec![7u8; 3 * READ_CHUNK_SIZE + 11];
        let mut buf = ScrubBuffer::unbounded();
        buf.read_from(&mut Cursor::new(payload.clone())).unwrap();
        assert_eq!(buf.len(), payload.len());
        assert_eq!(buf.as_slice(), &payload[..]);
    }

    #[test]
    fn read_past_limit_fails() {
        let mut buf = ScrubBuffer::with_limit(10);
        let err = buf.read_from(&mut Cursor::new(vec![1u8; 11])).unwrap_err();
        assert!(matches!(err, SandboxError::OutputTooLarge { limit: 10 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn equality_ignores_limit() {
        let mut limited = ScrubBuffer::with_limit(4);
        limited.extend(b"ab").unwrap();
        assert_eq!(limited, ScrubBuffer::from(b"ab".to_vec()));
        assert_eq!(limited.clone(), limited);
        assert_ne!(limited, ScrubBuffer::from(b"abc".to_vec()));
    }

    #[test]
    fn scrub_zeroes() {
        let mut bytes = *b"secret";
        scrub(&mut bytes);
        assert_eq!(bytes, [0u8; 6]);
    }
}
