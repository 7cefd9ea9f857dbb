//! Process-per-request isolation for untrusted transforms.
//!
//! The service never decodes payloads itself. Each request goes to a fresh
//! worker process ([`SandboxRunner`]) that confines itself with a seccomp
//! syscall filter ([`policy`]), runs the transform and reports through its
//! output and exit code ([`worker`], [`status`]). The parent folds whatever
//! happened into a [`SandboxOutcome`].

pub mod error;
pub mod outcome;
pub mod policy;
#[cfg(unix)]
pub mod runner;
pub mod scrub;
pub mod status;
pub mod worker;

pub use error::{Result, SandboxError};
pub use outcome::SandboxOutcome;
#[cfg(unix)]
pub use runner::{SandboxConfig, SandboxRunner, WorkerCommand, DEFAULT_MAX_OUTPUT};
pub use scrub::ScrubBuffer;
