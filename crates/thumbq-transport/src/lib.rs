//! Socket endpoints for the thumbq service.
//!
//! The service speaks a multi-part message protocol over connected byte
//! streams. This crate owns the lowest layer of that stack:
//! - [`Connection`], a connected stream implementing `Read + Write`
//! - [`UnixEndpoint`], one bound Unix domain socket path
//! - [`EndpointSet`], every address the service was asked to bind
//! - [`wait_readable`], `poll(2)` over listeners and connections together
//!
//! Framing lives one layer up in `thumbq-frame`.

pub mod error;

#[cfg(unix)]
pub mod endpoints;
#[cfg(unix)]
pub mod readiness;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use endpoints::EndpointSet;
#[cfg(unix)]
pub use readiness::{wait_readable, Readiness};
#[cfg(unix)]
pub use stream::Connection;
#[cfg(unix)]
pub use uds::{socket_path, UnixEndpoint};
