use std::io;

/// Errors raised while preparing or talking to a sandboxed worker.
///
/// None of these reach a caller of the service: the runner turns each one
/// into a [`SandboxOutcome`](crate::SandboxOutcome) and logs it.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("worker output exceeds {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("syscall filter unavailable: {0}")]
    Unsupported(&'static str),

    #[error("failed to install syscall filter: {0}")]
    Policy(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
