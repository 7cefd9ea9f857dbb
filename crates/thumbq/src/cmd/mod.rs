use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use thumbq_frame::{Crop, DEFAULT_MAX_PART_SIZE, DEFAULT_SCALE};
use thumbq_sandbox::DEFAULT_MAX_OUTPUT;
use thumbq_service::{Isolation, DEFAULT_MAX_CONNECTIONS};
use thumbq_transform::TransformKind;

use crate::exit::{CliError, CliResult, USAGE};
use crate::logging::LogLevel;
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve thumbnail requests on one or more socket addresses.
    Serve(ServeArgs),
    /// Send one request and print the reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run one sandboxed request from stdin to stdout.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

pub fn run(command: Command, format: OutputFormat, log_level: LogLevel) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, log_level),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Worker(args) => Ok(worker::run(args)),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket addresses to bind (paths, optionally prefixed with unix://).
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,
    /// Where transforms run.
    #[arg(long, env = "THUMBQ_ISOLATION", default_value = "sandbox")]
    pub isolation: Isolation,
    /// Transform applied to every request.
    #[arg(long, env = "THUMBQ_TRANSFORM", default_value = "thumbnail")]
    pub transform: TransformKind,
    /// Kill a worker that runs longer than this (e.g. 5s, 500ms). Default: no limit.
    #[arg(long, env = "THUMBQ_WORKER_TIMEOUT")]
    pub worker_timeout: Option<String>,
    /// Maximum bytes accepted from a worker.
    #[arg(long, env = "THUMBQ_MAX_OUTPUT", default_value_t = DEFAULT_MAX_OUTPUT)]
    pub max_output: usize,
    /// Maximum size of one message part.
    #[arg(long, env = "THUMBQ_MAX_PART_SIZE", default_value_t = DEFAULT_MAX_PART_SIZE)]
    pub max_part_size: usize,
    /// Close a connection that sends nothing for this long between requests
    /// ("off" keeps idle connections open).
    #[arg(long, env = "THUMBQ_IDLE_TIMEOUT", default_value = "60s")]
    pub idle_timeout: String,
    /// Connections served at once; later clients wait until one closes.
    #[arg(long, env = "THUMBQ_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum CropArg {
    #[default]
    None,
    TopSquare,
}

impl From<CropArg> for Crop {
    fn from(arg: CropArg) -> Self {
        match arg {
            CropArg::None => Crop::NoCrop,
            CropArg::TopSquare => Crop::TopSquare,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket address to connect to.
    pub address: String,
    /// Read the payload from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Maximum width and height of the result.
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    pub scale: u32,
    /// Crop applied before scaling.
    #[arg(long, value_enum, default_value_t = CropArg::None)]
    pub crop: CropArg,
    /// Declare this payload length instead of the real one.
    #[arg(long, value_name = "BYTES")]
    pub declared_length: Option<u64>,
    /// Send only the control part.
    #[arg(long, conflicts_with_all = ["file", "data"])]
    pub header_only: bool,
    /// Write the result bytes to this file.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Transform to run.
    #[arg(long, default_value = "thumbnail")]
    pub transform: TransformKind,
}

/// Parse `500ms`, `5s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn parse_optional_duration(input: Option<&str>) -> CliResult<Option<Duration>> {
    input.map(parse_duration).transpose()
}

/// A duration where "off" means no limit.
pub fn parse_limit(input: &str) -> CliResult<Option<Duration>> {
    if input.trim().eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    parse_duration(input).map(Some)
}
