//! External command hooks
//!
//! Two user-supplied shell commands bracket the store's lifecycle: one runs
//! once before the flush scheduler starts (to fetch or prepare data) and one
//! runs after every non-empty flush (to ship shards elsewhere). Both are
//! templates expanded with a [`HookContext`], run with a hard kill timeout,
//! and never fatal to the serving process.

mod template;

pub use template::render_template;

use crate::{Error, Result};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Values substituted into hook command templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    /// Store root directory (`{store_prefix}`)
    pub store_prefix: PathBuf,
    /// `"<yesterday>,<today>"` shard paths relative to a thing (`{fetch_shards}`)
    pub fetch_shards: String,
}

impl HookContext {
    /// Context for a hook invoked at `now`.
    ///
    /// Only yesterday's and today's shards can have been touched by a flush
    /// running now, which bounds what the hook needs to fetch.
    pub fn at(store_prefix: &Path, now: DateTime<Utc>) -> Self {
        let yesterday = now - ChronoDuration::days(1);
        Self {
            store_prefix: store_prefix.to_path_buf(),
            fetch_shards: format!("{},{}", day_shard(&yesterday), day_shard(&now)),
        }
    }
}

fn day_shard(ts: &DateTime<Utc>) -> String {
    ts.format("%Y/%m/%d.json").to_string()
}

/// How an external command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Success,
    Exit(i32),
    /// Terminated by a signal other than our timeout kill
    Signaled,
    TimedOut,
}

impl HookStatus {
    pub fn from_exit(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => HookStatus::Success,
            Some(code) => HookStatus::Exit(code),
            None => HookStatus::Signaled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HookStatus::Success)
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            HookStatus::Success => "ok",
            HookStatus::Exit(_) => "exit",
            HookStatus::Signaled => "signal",
            HookStatus::TimedOut => "timeout",
        }
    }
}

impl fmt::Display for HookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStatus::Success => write!(f, "ok"),
            HookStatus::Exit(code) => write!(f, "error {}", code),
            HookStatus::Signaled => write!(f, "error signal"),
            HookStatus::TimedOut => write!(f, "error timeout"),
        }
    }
}

/// Exit status plus combined stdout/stderr of one hook run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub status: HookStatus,
    pub output: String,
}

/// Runs an already-rendered command with a kill timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<HookOutcome>;
}

/// Runs commands through a shell, folding stderr into stdout.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl ShellCommandRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<HookOutcome> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(format!("exec 2>&1\n{}", command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so the timeout kill reaches subshells and
        // background jobs as well.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Hook(format!("failed to spawn {}: {}", self.shell, e)))?;
        let pid = child.id();

        let stdout = PipeBuffer::default();
        let stderr = PipeBuffer::default();
        let mut readers = [
            spawn_pipe_reader(child.stdout.take(), stdout.clone()),
            spawn_pipe_reader(child.stderr.take(), stderr.clone()),
        ];

        let deadline = Instant::now() + timeout;
        let exited = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => Some(HookStatus::from_exit(status?)),
            Err(_) => None,
        };
        // Pipes stay open while anything left in the group still holds them.
        let drained = tokio::time::timeout_at(deadline, join_readers(&mut readers))
            .await
            .is_ok();

        let status = match exited {
            Some(status) if drained => status,
            exited => {
                kill_process_group(pid);
                let _ = child.kill().await;
                let _ = tokio::time::timeout(PIPE_GRACE, join_readers(&mut readers)).await;
                exited.unwrap_or(HookStatus::TimedOut)
            }
        };

        let mut output = String::from_utf8_lossy(&stdout.take()).into_owned();
        output.push_str(&String::from_utf8_lossy(&stderr.take()));
        Ok(HookOutcome { status, output })
    }
}

/// How long to keep collecting output after the kill
const PIPE_GRACE: Duration = Duration::from_secs(1);

/// Bytes read so far from one child pipe
#[derive(Debug, Clone, Default)]
struct PipeBuffer(Arc<Mutex<Vec<u8>>>);

impl PipeBuffer {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }
}

fn spawn_pipe_reader<R>(pipe: Option<R>, sink: PipeBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.0.lock().extend_from_slice(&chunk[..n]),
            }
        }
    })
}

async fn join_readers(readers: &mut [JoinHandle<()>]) {
    for reader in readers.iter_mut() {
        // A consumed handle must not be polled again.
        if !reader.is_finished() {
            let _ = reader.await;
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "Failed to kill hook process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Render and run a hook, logging everything and swallowing failures.
///
/// Returns `None` when no command is configured or the hook could not be
/// started at all.
pub async fn run_hook(
    runner: &dyn CommandRunner,
    name: &'static str,
    template: Option<&str>,
    context: &HookContext,
    timeout: Duration,
) -> Option<HookOutcome> {
    let Some(template) = template.map(str::trim).filter(|t| !t.is_empty()) else {
        info!(hook = name, "no command specified");
        return None;
    };

    let command = match render_template(template, context) {
        Ok(command) => command,
        Err(e) => {
            error!(hook = name, error = %e, "Cannot render hook command");
            return None;
        }
    };

    info!(hook = name, command = %command, timeout_secs = timeout.as_secs(), "running command");
    let outcome = match runner.run(&command, timeout).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(hook = name, error = %e, "Hook failed to run");
            crate::ingester::telemetry::record_hook_outcome(name, "spawn_error");
            return None;
        }
    };
    crate::ingester::telemetry::record_hook_outcome(name, outcome.status.as_label());

    if outcome.status.is_success() {
        info!(hook = name, status = %outcome.status, "command returned");
    } else {
        warn!(hook = name, status = %outcome.status, "command returned");
    }
    for line in outcome.output.lines() {
        info!(hook = name, "{}: {}", outcome.status, line);
    }
    Some(outcome)
}
