//! Process runner for untrusted workspace code
//!
//! Every run gets a fresh OS process with:
//! - its own process group, so the whole tree can be signalled at once
//! - a scrubbed environment and `stdin` closed
//! - a wall-clock deadline (SIGTERM to the group, grace period, SIGKILL)
//! - stdout/stderr captured concurrently, each capped at `max_output_bytes`
//!
//! ```text
//! spawn ──► [leader + descendants share pgid]
//!   │
//!   ├── exits before deadline ──► SIGKILL leftover group members
//!   │
//!   ├── deadline hit ──► SIGTERM group ──grace──► SIGKILL group
//!   │
//!   └── caller drops the run ──► SIGKILL group, readers aborted
//! ```

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::CommandSpec;
use crate::error::{Result, SandboxError};

/// How long a group gets between SIGTERM and SIGKILL
const TERM_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// How long to wait for pipes to close once the process is gone
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-run resource limits
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

/// Captured output of one finished process
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when killed by a signal
    pub exit_code: Option<i32>,
    pub duration_ms: f64,
    pub timed_out: bool,
    pub truncated: bool,
}

/// Run `command` followed by `extra_args` inside `cwd` and capture its output
///
/// Launch failures are errors. Non-zero exits and timeouts are reported in
/// the returned [`RunOutput`].
pub async fn run_command(
    command: &CommandSpec,
    extra_args: &[&Path],
    cwd: &Path,
    limits: RunLimits,
) -> Result<RunOutput> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .args(extra_args)
        .current_dir(cwd)
        .env_clear()
        .env("HOME", cwd)
        .env("LANG", "C.UTF-8")
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: command.program.clone(),
        source,
    })?;
    let pgid = child.id().map(|id| Pid::from_raw(id as i32));

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let cap = limits.max_output_bytes;
    let stdout_task = tokio::spawn(async move { read_capped(stdout, cap).await });
    let stderr_task = tokio::spawn(async move { read_capped(stderr, cap).await });
    let mut guard = RunGuard {
        pgid,
        readers: [stdout_task.abort_handle(), stderr_task.abort_handle()],
        armed: true,
    };

    let (exit_code, timed_out) = match timeout(limits.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Background descendants would otherwise hold the pipes open
            if let Some(pgid) = pgid {
                signal_group(pgid, Signal::SIGKILL);
            }
            (status.code(), false)
        }
        Ok(Err(e)) => {
            terminate_group(&mut child, pgid).await;
            // Group is reaped; the guard only needs to stop the readers
            guard.pgid = None;
            return Err(SandboxError::Io(e));
        }
        Err(_) => {
            debug!(program = %command.program, timeout = ?limits.timeout, "Deadline reached, terminating process group");
            terminate_group(&mut child, pgid).await;
            (None, true)
        }
    };
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let (stdout, stdout_cut) = join_reader(stdout_task).await;
    let (stderr, stderr_cut) = join_reader(stderr_task).await;
    guard.disarm();

    let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "Execution timed out after {:.1}s",
            limits.timeout.as_secs_f64()
        ));
    }

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr,
        exit_code,
        duration_ms,
        timed_out,
        truncated: stdout_cut || stderr_cut,
    })
}

/// Kills the whole process group if a run is abandoned mid-flight
///
/// `kill_on_drop` only reaches the leader. When the caller's future is
/// dropped (request cancelled, client gone) this guard SIGKILLs every group
/// member and stops the pipe readers before the workspace gate is released.
struct RunGuard {
    pgid: Option<Pid>,
    readers: [tokio::task::AbortHandle; 2],
    armed: bool,
}

impl RunGuard {
    /// The group has been reaped; nothing left to kill
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pgid) = self.pgid {
            debug!(pgid = pgid.as_raw(), "Run abandoned, killing process group");
            signal_group(pgid, Signal::SIGKILL);
        }
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Read up to `cap` bytes, then drain and discard the rest
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut buf = Vec::new();
    (&mut reader).take(cap as u64).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((buf, discarded > 0))
}

async fn join_reader(
    task: tokio::task::JoinHandle<std::io::Result<(Vec<u8>, bool)>>,
) -> (Vec<u8>, bool) {
    let abort = task.abort_handle();
    match timeout(PIPE_DRAIN_TIMEOUT, task).await {
        Ok(Ok(Ok(captured))) => captured,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Failed to read process output");
            (Vec::new(), true)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Output reader task failed");
            (Vec::new(), true)
        }
        Err(_) => {
            // A descendant escaped the group and still holds the pipe
            abort.abort();
            warn!("Output pipe still open after process exit, giving up");
            (Vec::new(), true)
        }
    }
}

/// SIGTERM the group, wait out the grace period, then SIGKILL and reap
async fn terminate_group(child: &mut Child, pgid: Option<Pid>) {
    let Some(pgid) = pgid else {
        // Already reaped
        return;
    };

    signal_group(pgid, Signal::SIGTERM);
    if let Ok(Ok(_)) = timeout(TERM_GRACE_PERIOD, child.wait()).await {
        // Leader is gone; make sure nothing else in the group survives
        signal_group(pgid, Signal::SIGKILL);
        return;
    }

    signal_group(pgid, Signal::SIGKILL);
    if let Err(e) = child.wait().await {
        warn!(pgid = pgid.as_raw(), error = %e, "Failed to reap killed process");
    }
}

fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pgid.as_raw(), ?signal, error = %e, "Failed to signal process group"),
    }
}
