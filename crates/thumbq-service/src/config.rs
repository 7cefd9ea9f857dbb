use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thumbq_frame::PartConfig;
#[cfg(unix)]
use thumbq_sandbox::{SandboxConfig, SandboxRunner, WorkerCommand};
use thumbq_transform::TransformKind;

use crate::executor::{DirectExecutor, Executor};
#[cfg(unix)]
use crate::executor::SandboxExecutor;

/// How often the serving loop wakes up to check the stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a connection may sit between messages before it is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a response write may block on a peer that is not reading.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connections served at once; further clients wait in the listen backlog.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Serving loop configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Part size limit and write timeout for connections. The read timeout
    /// is replaced by `poll_interval`.
    pub part: PartConfig,
    /// Close a connection that sends nothing for this long while none of
    /// its requests is waiting for an answer. `None` keeps idle connections
    /// open.
    pub idle_timeout: Option<Duration>,
    pub max_connections: usize,
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            part: PartConfig {
                write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
                ..PartConfig::default()
            },
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Where transforms run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Isolation {
    /// A fresh confined worker process per request.
    #[default]
    Sandbox,
    /// Directly in the serving process. For trusted input and debugging.
    InProcess,
}

impl Isolation {
    pub fn as_str(self) -> &'static str {
        match self {
            Isolation::Sandbox => "sandbox",
            Isolation::InProcess => "in-process",
        }
    }

    /// Build the executor for this isolation level. `worker` starts a worker
    /// process and is only used by [`Isolation::Sandbox`].
    #[cfg(unix)]
    pub fn executor(
        self,
        transform: TransformKind,
        worker: WorkerCommand,
        sandbox: SandboxConfig,
    ) -> Box<dyn Executor> {
        match self {
            Isolation::Sandbox => Box::new(SandboxExecutor::new(SandboxRunner::with_config(
                worker, sandbox,
            ))),
            Isolation::InProcess => Box::new(DirectExecutor::new(transform.build())),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(Isolation::Sandbox),
            "in-process" => Ok(Isolation::InProcess),
            other => Err(format!("unknown isolation: {other}")),
        }
    }
}
