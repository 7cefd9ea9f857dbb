use std::path::PathBuf;

/// Errors raised by socket endpoints and connections.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Waiting for readiness on the bound endpoints failed.
    #[error("failed to poll endpoints: {0}")]
    Poll(std::io::Error),

    /// An I/O error occurred on a connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// No address was supplied to bind.
    #[error("no endpoint addresses given")]
    NoEndpoints,
}

pub type Result<T> = std::result::Result<T, TransportError>;
