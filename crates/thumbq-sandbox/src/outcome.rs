use std::fmt;
use std::process::ExitStatus;

use crate::scrub::ScrubBuffer;
use crate::status;

/// What came of running one request through an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// Worker exited cleanly; carries everything it wrote (may be empty).
    /// The bytes are zeroed when the outcome is dropped.
    Success(ScrubBuffer),
    /// Worker refused the input with one of the rejection codes.
    RejectedInput(i32),
    /// Worker failed to set up, died from a signal or exited with a code
    /// that means nothing to us.
    WorkerCrashed,
    WorkerTimedOut,
    /// Could not spawn the worker or exchange data with it.
    TransportFailure,
}

impl SandboxOutcome {
    /// Classify a reaped worker. `output` is only kept on a clean exit;
    /// otherwise it is dropped here, which zeroes it.
    #[cfg(unix)]
    pub fn from_exit(exit: ExitStatus, output: ScrubBuffer) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (exit.code(), exit.signal()) {
            (Some(status::SUCCESS), _) => SandboxOutcome::Success(output),
            (Some(code), _) if status::is_rejection(code) => SandboxOutcome::RejectedInput(code),
            (Some(code), _) => {
                tracing::error!(code, reason = status::describe(code), "worker failed");
                SandboxOutcome::WorkerCrashed
            }
            (None, signal) => {
                tracing::error!(signal = signal.unwrap_or_default(), "worker killed by signal");
                SandboxOutcome::WorkerCrashed
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SandboxOutcome::Success(_) => "success",
            SandboxOutcome::RejectedInput(_) => "rejected",
            SandboxOutcome::WorkerCrashed => "crashed",
            SandboxOutcome::WorkerTimedOut => "timed_out",
            SandboxOutcome::TransportFailure => "transport_failure",
        }
    }
}

impl fmt::Display for SandboxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxOutcome::Success(bytes) => write!(f, "success ({} bytes)", bytes.len()),
            SandboxOutcome::RejectedInput(code) => {
                write!(f, "rejected ({code}: {})", status::describe(*code))
            }
            other => f.write_str(other.kind()),
        }
    }
}
