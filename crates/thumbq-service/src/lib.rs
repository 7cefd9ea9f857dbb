//! Request/response serving for thumbq.
//!
//! One thread watches every bound endpoint and every open connection and
//! answers one complete request at a time from whichever connection has
//! one ready. Each request goes through a [`RequestContext`], which
//! guarantees exactly one response, and a [`Coordinator`], which validates
//! it and hands it to an [`Executor`]: in process, or in a sandboxed worker.

#[cfg(unix)]
pub mod client;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod message;
#[cfg(unix)]
pub mod server;

#[cfg(unix)]
pub use client::{Client, Reply};
pub use config::{
    Isolation, ServiceConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_POLL_INTERVAL, DEFAULT_WRITE_TIMEOUT,
};
pub use context::RequestContext;
pub use coordinator::Coordinator;
pub use error::{Result, ServiceError};
#[cfg(unix)]
pub use executor::SandboxExecutor;
pub use executor::{DirectExecutor, Executor};
pub use message::{Completeness, Message, MessageSocket};
#[cfg(unix)]
pub use server::Server;
