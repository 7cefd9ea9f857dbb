use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected client stream.
///
/// One `Connection` carries any number of request/response cycles. Reads
/// and writes are blocking, bounded by the configured timeouts.
pub struct Connection {
    inner: std::os::unix::net::UnixStream,
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::os::fd::AsRawFd for Connection {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        std::os::fd::AsRawFd::as_raw_fd(&self.inner)
    }
}

impl From<std::os::unix::net::UnixStream> for Connection {
    fn from(inner: std::os::unix::net::UnixStream) -> Self {
        Self { inner }
    }
}

impl Connection {
    /// Set the read timeout. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set the write timeout. `None` blocks indefinitely.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Duplicate the descriptor so reading and writing halves can be owned
    /// separately.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
        })
    }

    /// Process id of the connected peer, via `SO_PEERCRED`.
    #[cfg(target_os = "linux")]
    pub fn peer_pid(&self) -> Option<u32> {
        use std::os::fd::AsRawFd;

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and the descriptor is an open Unix socket owned by this connection.
        let rc = unsafe {
            libc::getsockopt(
                self.inner.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() && cred.pid > 0 {
            Some(cred.pid as u32)
        } else {
            None
        }
    }

    /// Process id of the connected peer; unavailable on this platform.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_pid(&self) -> Option<u32> {
        None
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_pid", &self.peer_pid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_roundtrip_through_clone() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut left = Connection::from(left);
        let right = Connection::from(right);
        let mut reader = right.try_clone().unwrap();

        left.write_all(b"part").unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"part");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn peer_pid_is_own_process_for_socketpair() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let conn = Connection::from(left);
        assert_eq!(conn.peer_pid(), Some(std::process::id()));
    }

    #[test]
    fn read_timeout_applies() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut conn = Connection::from(left);
        conn.set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();

        let mut buf = [0u8; 1];
        let err = conn.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }
}
