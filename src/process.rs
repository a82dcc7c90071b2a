//! Shell command execution with a timeout and combined output capture.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Result of a finished (or abandoned) shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    /// stdout and stderr interleaved in write order.
    pub output: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `command` through `sh -c` inside `dir`.
///
/// stderr is redirected into stdout before the command runs so the captured
/// text keeps the order a terminal would show. The shell leads its own
/// process group; when the timeout elapses the whole group is killed, so
/// nothing the command forked outlives it. Errors are returned only when the
/// shell cannot be spawned or waited on.
#[instrument(skip_all, fields(dir = %dir.display(), timeout_secs = limit.as_secs()))]
pub async fn run_shell(command: &str, dir: &Path, limit: Duration) -> Result<CommandOutput> {
    debug!(command, "spawning shell command");
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(format!("exec 2>&1\n{}", command))
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn `sh -c {}`", command))?;
    let pid = child.id();
    let stdout = tokio::spawn(read_pipe(child.stdout.take()));
    let stderr = tokio::spawn(read_pipe(child.stderr.take()));

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status.context("Failed to wait for shell command")?;
            let mut text = String::from_utf8_lossy(&stdout.await.unwrap_or_default()).into_owned();
            let err = stderr.await.unwrap_or_default();
            if !err.is_empty() {
                text.push_str(&String::from_utf8_lossy(&err));
            }
            debug!(exit_code = ?status.code(), bytes = text.len(), "command finished");
            Ok(CommandOutput {
                exit_code: status.code(),
                output: text,
                timed_out: false,
            })
        }
        Err(_) => {
            kill_group(pid);
            if let Err(e) = child.kill().await {
                debug!(error = %e, "shell already gone after group kill");
            }
            stdout.abort();
            stderr.abort();
            warn!(command, "command timed out, process group killed");
            Ok(CommandOutput {
                exit_code: None,
                output: format!(
                    "command timed out after {}s: {}",
                    limit.as_secs(),
                    command
                ),
                timed_out: true,
            })
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut pipe) = pipe else {
        return buf;
    };
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "failed to read command output");
    }
    buf
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
