//! External process execution with output capture and timeouts.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last `max_chars` characters of stderr, for error messages.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        tail(&self.stderr, max_chars)
    }
}

/// Run a program to completion, capturing stdout and stderr.
///
/// The child is killed if the timeout elapses; dropping the wait future
/// takes the process with it.
pub async fn run_process<S, I, A>(
    program: S,
    args: I,
    timeout: Option<Duration>,
) -> MediaResult<ProcessOutput>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let program = program.as_ref();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = ?program, "Spawning process");
    let child = command.spawn()?;
    let wait = child.wait_with_output();

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(program = ?program, timeout_secs = limit.as_secs(), "Process timed out, killed");
                return Err(MediaError::Timeout(limit.as_secs()));
            }
        },
        None => wait.await?,
    };

    Ok(ProcessOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Resolve a program on PATH.
pub fn check_program(name: &str) -> MediaResult<PathBuf> {
    which::which(name).map_err(|_| MediaError::ToolNotFound(name.to_string()))
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
