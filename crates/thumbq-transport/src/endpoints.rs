use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::Connection;
use crate::uds::{socket_path, UnixEndpoint};

/// Every endpoint the service listens on, served from one thread.
///
/// The set only owns the listeners; the serving loop polls
/// [`raw_fds`](Self::raw_fds) together with its open connections and
/// accepts from whichever endpoints are ready.
#[derive(Debug)]
pub struct EndpointSet {
    endpoints: Vec<UnixEndpoint>,
}

impl EndpointSet {
    /// Bind every address. Fails on the first address that cannot be bound;
    /// endpoints bound before it are released.
    pub fn bind<S: AsRef<str>>(addresses: &[S]) -> Result<Self> {
        if addresses.is_empty() {
            return Err(TransportError::NoEndpoints);
        }
        let endpoints = addresses
            .iter()
            .map(|address| UnixEndpoint::bind(socket_path(address.as_ref())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { endpoints })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Listening descriptors, in bind order, for readiness polling.
    pub fn raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.endpoints.iter().map(AsRawFd::as_raw_fd)
    }

    /// Accept a pending connection on the endpoint at `index`.
    pub fn accept(&self, index: usize) -> Result<Connection> {
        let endpoint = self.endpoints.get(index).ok_or_else(|| {
            TransportError::Accept(std::io::Error::other(format!("no endpoint at index {index}")))
        })?;
        let conn = endpoint.accept()?;
        debug!(
            endpoint = %endpoint.path().display(),
            peer_pid = ?conn.peer_pid(),
            "accepted connection"
        );
        Ok(conn)
    }

    /// Paths of the bound endpoints, in bind order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.endpoints.iter().map(UnixEndpoint::path)
    }
}
