//! Runs an approved command line through the system shell.
//!
//! The line is handed to the shell verbatim: arguments are concatenated onto
//! the base command with no quoting, escaping or sandboxing. Callers must only
//! pass lines whose base command came from the registry.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::GatewayError;

/// Returned when a command succeeds with empty stdout and stderr.
pub const NO_OUTPUT: &str = "(no output)";

/// Successful run.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub output: String,
    pub elapsed: Duration,
}

/// Failed run: spawn error, non-zero exit, or timeout.
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub message: String,
    pub elapsed: Duration,
}

impl From<ExecutionFailure> for GatewayError {
    fn from(failure: ExecutionFailure) -> Self {
        GatewayError::Execution(failure.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    /// `None` lets the process run for as long as it likes.
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run `command_line` and wait for it to exit.
    pub async fn run(&self, command_line: &str) -> Result<ExecutionOutcome, ExecutionFailure> {
        let started = Instant::now();
        let fail = |message: String| ExecutionFailure {
            message,
            elapsed: started.elapsed(),
        };

        let mut c = shell_command(command_line);
        c.kill_on_drop(true);
        c.stdin(Stdio::null());

        debug!("Spawning: {}", command_line);
        let res = match self.timeout {
            Some(limit) => match timeout(limit, c.output()).await {
                Ok(res) => res,
                Err(_) => return Err(fail(format!("timed out after {:?}", limit))),
            },
            None => c.output().await,
        };
        let res = res.map_err(|e| fail(format!("failed to start '{}': {}", command_line, e)))?;

        let stdout = String::from_utf8_lossy(&res.stdout);
        let stderr = String::from_utf8_lossy(&res.stderr);

        if !res.status.success() {
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("'{}' exited with {}", command_line, res.status)
            } else {
                format!("'{}' exited with {}: {}", command_line, res.status, detail)
            };
            return Err(fail(message));
        }

        let output = if !stdout.trim().is_empty() {
            stdout.into_owned()
        } else if !stderr.trim().is_empty() {
            stderr.into_owned()
        } else {
            NO_OUTPUT.to_string()
        };

        Ok(ExecutionOutcome {
            output,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(not(windows))]
fn shell_command(command_line: &str) -> Command {
    let mut c = Command::new("/bin/sh");
    c.arg("-c").arg(command_line);
    c
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut c = Command::new("cmd");
    c.arg("/C").arg(command_line);
    c
}
