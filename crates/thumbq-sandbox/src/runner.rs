//! Parent side of the sandbox: spawn one worker per request, feed it the
//! request and collect what it writes back.

use std::ffi::OsString;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{Result, SandboxError};
use crate::outcome::SandboxOutcome;
use crate::scrub::ScrubBuffer;

/// Default ceiling on worker output.
pub const DEFAULT_MAX_OUTPUT: usize = 16 * 1024 * 1024;

/// Program and arguments that start a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable; callers add the worker sub-command.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                program: self.program.display().to_string(),
                source,
            })
    }
}

/// Sandbox runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Maximum number of bytes accepted from a worker.
    pub max_output: usize,
    /// Kill a worker that runs longer than this. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_output: DEFAULT_MAX_OUTPUT,
            timeout: None,
        }
    }
}

/// Runs each request in a fresh worker process.
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    command: WorkerCommand,
    config: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(command: WorkerCommand) -> Self {
        Self::with_config(command, SandboxConfig::default())
    }

    pub fn with_config(command: WorkerCommand, config: SandboxConfig) -> Self {
        Self { command, config }
    }

    /// Run one request. `header` is the encoded control header part and
    /// `payload` the attachment; the worker receives them concatenated.
    ///
    /// Never fails: every problem is folded into the returned outcome.
    pub fn run(&self, header: &[u8], payload: &[u8]) -> SandboxOutcome {
        let mut child = match self.command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(error = %err, "cannot start worker");
                return SandboxOutcome::TransportFailure;
            }
        };
        let pid = child.id();
        debug!(pid, len = header.len() + payload.len(), "worker started");

        let watchdog = self.config.timeout.map(|limit| Watchdog::start(pid, limit));
        let exchanged = self.exchange(&mut child, header, payload);
        if exchanged.is_err() {
            let _ = child.kill();
        }

        // The child stays a zombie until the watchdog is gone, so the pid it
        // holds cannot be reused under it.
        wait_exited(pid);
        let timed_out = watchdog.is_some_and(Watchdog::finish);

        let status = match child.wait() {
            Ok(status) => status,
            Err(err) => {
                error!(pid, error = %err, "cannot reap worker");
                return SandboxOutcome::TransportFailure;
            }
        };

        if timed_out {
            warn!(pid, timeout = ?self.config.timeout, "worker timed out");
            return SandboxOutcome::WorkerTimedOut;
        }
        match exchanged {
            Ok(output) => SandboxOutcome::from_exit(status, output),
            Err(err) => {
                error!(pid, error = %err, "worker exchange failed");
                SandboxOutcome::TransportFailure
            }
        }
    }

    /// Feed the request to the worker while collecting its output. Stdin
    /// is written from a scoped thread so a worker that answers before it
    /// has read everything cannot stall on a full pipe.
    fn exchange(&self, child: &mut Child, header: &[u8], payload: &[u8]) -> Result<ScrubBuffer> {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let mut output = ScrubBuffer::with_limit(self.config.max_output);

        thread::scope(|scope| {
            let feeder = stdin.map(|mut stdin| {
                scope.spawn(move || {
                    match stdin.write_all(header).and_then(|()| stdin.write_all(payload)) {
                        // The worker stopped reading; its exit status says why.
                        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                        written => written,
                    }
                })
            });

            let read = match stdout {
                Some(mut stdout) => output.read_from(&mut stdout),
                None => Ok(()),
            };
            if read.is_err() {
                // Unblocks a feeder stuck on a worker that no longer reads.
                let _ = child.kill();
            }

            let fed = match feeder {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin feeder panicked"))),
                None => Ok(()),
            };
            read?;
            fed.map_err(SandboxError::Io)
        })?;
        Ok(output)
    }
}

/// Kills a worker by pid when its time is up.
struct Watchdog {
    cancel: Sender<()>,
    handle: JoinHandle<bool>,
}

impl Watchdog {
    fn start(pid: u32, limit: Duration) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match cancelled.recv_timeout(limit) {
            Err(RecvTimeoutError::Timeout) => {
                kill(pid);
                true
            }
            _ => false,
        });
        Self { cancel, handle }
    }

    /// Stop the watchdog; true when it had to kill the worker.
    fn finish(self) -> bool {
        let _ = self.cancel.send(());
        self.handle.join().unwrap_or(false)
    }
}

fn kill(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: plain signal delivery; the pid is an unreaped child of ours.
    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }
}

/// Block until the child has exited, leaving it unreaped.
fn wait_exited(pid: u32) {
    let id = pid as libc::id_t;
    loop {
        // SAFETY: waitid writes only into `info`.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                id,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 || io::Error::last_os_error().kind() != ErrorKind::Interrupted {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::status;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("/bin/sh").args(["-c", script])
    }

    fn run(script: &str) -> SandboxOutcome {
        SandboxRunner::new(sh(script)).run(b"header", b"payload")
    }

    fn success(bytes: &[u8]) -> SandboxOutcome {
        SandboxOutcome::Success(ScrubBuffer::from(bytes.to_vec()))
    }

    #[test]
    fn echo_worker_returns_input() {
        assert_eq!(run("cat"), success(b"headerpayload"));
    }

    #[test]
    fn silent_clean_exit_is_empty_success() {
        assert_eq!(run("cat >/dev/null; exit 0"), success(b""));
    }

    #[test]
    fn rejection_code_is_reported() {
        assert_eq!(
            run("cat >/dev/null; exit 6"),
            SandboxOutcome::RejectedInput(status::LENGTH_MISMATCH)
        );
    }

    #[test]
    fn signal_death_is_a_crash() {
        assert_eq!(run("kill -SEGV $$"), SandboxOutcome::WorkerCrashed);
    }

    #[test]
    fn setup_failure_and_unknown_codes_are_crashes() {
        assert_eq!(run("exit 1"), SandboxOutcome::WorkerCrashed);
        assert_eq!(run("cat >/dev/null; exit 42"), SandboxOutcome::WorkerCrashed);
    }

    #[test]
    fn worker_that_ignores_large_input() {
        let payload = vec![0u8; 4 * 1024 * 1024];
        let outcome = SandboxRunner::new(sh("exit 3")).run(b"", &payload);
        assert_eq!(outcome, SandboxOutcome::RejectedInput(status::BAD_HEADER_LENGTH));
    }

    #[test]
    fn oversized_output_is_transport_failure() {
        let config = SandboxConfig {
            max_output: 1024,
            ..SandboxConfig::default()
        };
        let runner = SandboxRunner::with_config(sh("head -c 100000 /dev/zero"), config);
        assert_eq!(runner.run(b"", b""), SandboxOutcome::TransportFailure);
    }

    #[test]
    fn missing_program_is_transport_failure() {
        let runner = SandboxRunner::new(WorkerCommand::new("/nonexistent/thumbq-worker"));
        assert_eq!(runner.run(b"h", b"p"), SandboxOutcome::TransportFailure);
    }

    #[test]
    fn hung_worker_times_out() {
        let config = SandboxConfig {
            timeout: Some(Duration::from_millis(100)),
            ..SandboxConfig::default()
        };
        let runner = SandboxRunner::with_config(sh("exec sleep 10"), config);

        let started = Instant::now();
        assert_eq!(runner.run(b"", b""), SandboxOutcome::WorkerTimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn fast_worker_beats_timeout() {
        let config = SandboxConfig {
            timeout: Some(Duration::from_secs(10)),
            ..SandboxConfig::default()
        };
        let runner = SandboxRunner::with_config(sh("cat"), config);
        assert_eq!(runner.run(b"a", b"b"), success(b"ab"));
    }

    #[test]
    fn worker_answering_while_reading_large_input() {
        let config = SandboxConfig {
            timeout: Some(Duration::from_secs(20)),
            ..SandboxConfig::default()
        };
        let payload = vec![b'x'; 1024 * 1024];
        let runner = SandboxRunner::with_config(sh("cat"), config);

        match runner.run(b"head", &payload) {
            SandboxOutcome::Success(output) => {
                assert_eq!(output.len(), 4 + payload.len());
                assert!(output.as_slice().starts_with(b"headxxxx"));
            }
            other => panic!("expected success, got {other}"),
        }
    }
}
