//! Where a request's transform actually runs.

use std::panic::{self, AssertUnwindSafe};

use thumbq_sandbox::{status, worker, SandboxOutcome};
#[cfg(unix)]
use thumbq_sandbox::SandboxRunner;
use thumbq_transform::Transform;
use tracing::error;

/// Runs one request and reports the outcome.
///
/// `header` is the encoded request control part and `payload` the
/// attachment. On success the outcome carries the encoded response header
/// followed by the result bytes.
pub trait Executor {
    fn execute(&self, header: &[u8], payload: &[u8]) -> SandboxOutcome;
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&self, header: &[u8], payload: &[u8]) -> SandboxOutcome {
        (**self).execute(header, payload)
    }
}

/// Runs the transform inside the service process.
///
/// Only isolation differs from [`SandboxExecutor`]: input checks, output
/// encoding and error codes are the worker's own.
#[derive(Debug, Clone)]
pub struct DirectExecutor<T> {
    transform: T,
}

impl<T: Transform> DirectExecutor<T> {
    pub fn new(transform: T) -> Self {
        Self { transform }
    }
}

impl<T: Transform> Executor for DirectExecutor<T> {
    fn execute(&self, header: &[u8], payload: &[u8]) -> SandboxOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            worker::respond(header, payload, &self.transform)
        }));
        match result {
            Ok(Ok(response)) => SandboxOutcome::Success(response.into()),
            Ok(Err(code)) if status::is_rejection(code) => SandboxOutcome::RejectedInput(code),
            Ok(Err(code)) => {
                error!(code, reason = status::describe(code), "transform failed");
                SandboxOutcome::WorkerCrashed
            }
            Err(_) => {
                error!(transform = self.transform.name(), "transform panicked");
                SandboxOutcome::WorkerCrashed
            }
        }
    }
}

/// Runs every request in a fresh sandboxed worker process.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    runner: SandboxRunner,
}

#[cfg(unix)]
impl SandboxExecutor {
    pub fn new(runner: SandboxRunner) -> Self {
        Self { runner }
    }
}

#[cfg(unix)]
impl Executor for SandboxExecutor {
    fn execute(&self, header: &[u8], payload: &[u8]) -> SandboxOutcome {
        self.runner.run(header, payload)
    }
}
