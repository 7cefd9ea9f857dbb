//! Readiness polling over raw descriptors.

use std::io::{self, ErrorKind};
use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// What `poll(2)` reported for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Idle,
    /// Data is waiting or the peer hung up; the next read will not block.
    Readable,
    /// The descriptor itself is unusable.
    Failed,
}

/// Wait up to `timeout` for any of `fds` to become readable.
///
/// Returns one entry per descriptor, in order. A wait interrupted by a
/// signal reports every descriptor idle.
pub fn wait_readable(fds: &[RawFd], timeout: Duration) -> Result<Vec<Readiness>> {
    let mut polled: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    // SAFETY: `polled` is a live, correctly sized array of pollfd for the duration of the call.
    let rc = unsafe { libc::poll(polled.as_mut_ptr(), polled.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(vec![Readiness::Idle; fds.len()]);
        }
        return Err(TransportError::Poll(err));
    }

    Ok(polled.iter().map(|entry| classify(entry.revents)).collect())
}

fn classify(revents: libc::c_short) -> Readiness {
    if revents & libc::POLLNVAL != 0 {
        Readiness::Failed
    } else if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
        Readiness::Readable
    } else {
        Readiness::Idle
    }
}
