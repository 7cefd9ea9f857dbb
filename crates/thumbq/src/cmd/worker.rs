use std::io::Write;

use crate::cmd::WorkerArgs;

/// Runs in the child process; the exit code is the whole report.
pub fn run(args: WorkerArgs) -> i32 {
    let transform = args.transform.build();
    let code = thumbq_sandbox::worker::run(&transform);
    let _ = std::io::stdout().flush();
    code
}
