//! Subprocess execution for shell modules.
//!
//! [`ProcessRunner`] starts the executable with a cleared environment,
//! captures stdout and stderr on reader threads into bounded buffers, and
//! waits for exit, killing the child when it outlives its budget.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::error::ShellError;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shell");

/// Bytes kept from each output stream; the rest is read and discarded.
pub const CAPTURE_LIMIT: usize = 64 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything needed to run one shell module invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    /// Executable to run.
    pub program: Utf8PathBuf,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Complete child environment.
    pub env: Vec<(String, String)>,
    /// Wall-clock budget.
    pub timeout: Option<Duration>,
}

impl ShellInvocation {
    /// Looks up an environment entry.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit status, or `-1` when terminated by a signal.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ShellOutput {
    /// Returns `true` for a zero exit status.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs shell module subprocesses.
///
/// [`ProcessRunner`] is the production implementation; tests substitute a
/// double that returns canned output.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError`] when the process cannot be started or waited
    /// for, or exceeds its timeout.
    fn run(&self, invocation: &ShellInvocation) -> Result<ShellOutput, ShellError>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &ShellInvocation) -> Result<ShellOutput, ShellError> {
        let program = invocation.program.as_path();
        let mut command = Command::new(program.as_std_path());
        command
            .args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            target: PROCESS_TARGET,
            program = %program,
            args = invocation.args.len(),
            "spawning shell module"
        );
        let mut child = command.spawn().map_err(|source| ShellError::Spawn {
            program: program.to_path_buf(),
            source: Arc::new(source),
        })?;

        let stdout = child.stdout.take().map(capture);
        let stderr = child.stderr.take().map(capture);

        let status = wait_for_exit(program, &mut child, invocation.timeout)?;
        let output = ShellOutput {
            status: status.code().unwrap_or(-1),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(
            target: PROCESS_TARGET,
            program = %program,
            status = output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "shell module exited"
        );
        Ok(output)
    }
}

fn capture(mut stream: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut kept = Vec::new();
        let mut chunk = [0_u8; 8192];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    let room = CAPTURE_LIMIT.saturating_sub(kept.len());
                    kept.extend(chunk.iter().take(read.min(room)));
                }
            }
        }
        kept
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|reader| reader.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn wait_for_exit(
    program: &Utf8Path,
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ShellError> {
    let wait_error = |source| ShellError::Wait {
        program: program.to_path_buf(),
        source: Arc::new(source),
    };
    let Some(budget) = timeout else {
        return child.wait().map_err(wait_error);
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(wait_error)? {
            return Ok(status);
        }
        if start.elapsed() > budget {
            warn!(
                target: PROCESS_TARGET,
                program = %program,
                timeout_ms = duration_ms(budget),
                "shell module timed out, killing process"
            );
            drop(child.kill());
            drop(child.wait());
            return Err(ShellError::Timeout {
                program: program.to_path_buf(),
                timeout_ms: duration_ms(budget),
            });
        }
        thread::sleep(POLL_INTERVAL.min(budget));
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
