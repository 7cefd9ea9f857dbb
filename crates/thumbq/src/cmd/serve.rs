use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thumbq_frame::PartConfig;
use thumbq_sandbox::{SandboxConfig, WorkerCommand};
use thumbq_service::{Server, ServiceConfig, ServiceError};
use tracing::{error, info};

use crate::cmd::{parse_limit, parse_optional_duration, ServeArgs};
use crate::exit::{io_error, service_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::logging::LogLevel;

pub fn run(args: ServeArgs, log_level: LogLevel) -> CliResult<i32> {
    let worker_timeout = parse_optional_duration(args.worker_timeout.as_deref())?;
    let idle_timeout = parse_limit(&args.idle_timeout)?;

    let worker = WorkerCommand::current_exe()
        .map_err(|err| io_error("cannot locate worker executable", err))?
        .args(["--log-level", log_level.as_arg(), "worker", "--transform"])
        .arg(args.transform.as_str());
    let sandbox = SandboxConfig {
        max_output: args.max_output,
        timeout: worker_timeout,
    };
    let executor = args.isolation.executor(args.transform, worker, sandbox);

    let config = ServiceConfig {
        part: PartConfig {
            max_part_size: args.max_part_size,
            ..ServiceConfig::default().part
        },
        idle_timeout,
        max_connections: args.max_connections.max(1),
        ..ServiceConfig::default()
    };
    let mut server = Server::bind(&args.addresses, executor, config)
        .map_err(|err| service_error("bind failed", err))?;
    install_ctrlc_handler(server.running())?;

    info!(
        isolation = %args.isolation,
        transform = %args.transform,
        worker_timeout = ?worker_timeout,
        idle_timeout = ?idle_timeout,
        "thumbq ready"
    );

    match server.serve() {
        Ok(()) => Ok(SUCCESS),
        Err(err) => {
            error!(error = %err, "listening endpoints failed");
            Err(endpoint_failure(err))
        }
    }
}

fn endpoint_failure(err: ServiceError) -> CliError {
    CliError::new(TRANSPORT_ERROR, format!("serve failed: {err}"))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
