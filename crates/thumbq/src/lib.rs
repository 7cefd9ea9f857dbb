//! Sandboxed thumbnail request/response service.
//!
//! thumbq answers thumbnail requests over Unix sockets. Every payload is
//! decoded in a short-lived worker process confined by a seccomp filter, so
//! a hostile image can at worst kill its own worker.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix socket endpoints and connections
//! - [`frame`]: multi-part framing and the control header codec
//! - [`transform`]: the thumbnail and identity transforms
//! - [`sandbox`]: worker processes, syscall policy and exit codes
//! - [`service`]: serving loop, coordinator and client

/// Re-export transport types.
pub mod transport {
    pub use thumbq_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use thumbq_frame::*;
}

/// Re-export transform types.
pub mod transform {
    pub use thumbq_transform::*;
}

/// Re-export sandbox types.
pub mod sandbox {
    pub use thumbq_sandbox::*;
}

/// Re-export service types.
pub mod service {
    pub use thumbq_service::*;
}
