//! Ownership of a single spawned child process.
//!
//! A [`ManagedProcess`] is created with `kill_on_drop(true)`, so a handle
//! dropped on an error path still takes its process down. Orderly teardown
//! goes through [`ManagedProcess::terminate_and_wait`]: a termination
//! request, a bounded grace period, then a force-kill.
//!
//! When output is captured, stdout and stderr are drained line by line into
//! the `child_output` tracing target, and the last stderr lines are kept for
//! the exit diagnostic.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::CommandSpec;
use crate::{AppError, Result};

/// Number of trailing stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Observed state of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Still running.
    Running,
    /// Exited on its own with the given status code.
    Exited(i32),
    /// Terminated by a signal (including our own force-kill).
    Killed,
}

impl ProcessState {
    fn from_status(status: ExitStatus) -> Self {
        status.code().map_or(Self::Killed, Self::Exited)
    }

    /// Exit code, if the process exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Running | Self::Killed => None,
        }
    }

    /// Whether the process has finished.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Which path [`ManagedProcess::terminate_and_wait`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The process had already finished; nothing was sent.
    AlreadyExited(ProcessState),
    /// The process exited within the grace period after the request.
    Graceful(ProcessState),
    /// The grace period elapsed and the process was force-killed.
    ForceKilled,
}

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// stdin closed; stdout and stderr piped into the log.
    Capture,
    /// All three streams shared with the parent terminal.
    Inherit,
}

/// Extra settings for [`ManagedProcess::spawn`].
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Stream wiring.
    pub stdio: StdioMode,
    /// Environment variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl SpawnOptions {
    /// Captured output, no extra environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            stdio: StdioMode::Capture,
            env: Vec::new(),
        }
    }

    /// Inherited terminal, no extra environment.
    #[must_use]
    pub fn inherit() -> Self {
        Self {
            stdio: StdioMode::Inherit,
            env: Vec::new(),
        }
    }

    /// Add one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Exclusive owner of one spawned OS process.
#[derive(Debug)]
pub struct ManagedProcess {
    label: &'static str,
    child: Child,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    state: ProcessState,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl ManagedProcess {
    /// Spawn `spec` and take ownership of the process.
    ///
    /// `label` names the role (`login_stage`, `main_stage`, ...) in logs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the executable is missing or cannot be
    /// started.
    pub fn spawn(label: &'static str, spec: &CommandSpec, options: &SpawnOptions) -> Result<Self> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args).kill_on_drop(true);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        match options.stdio {
            StdioMode::Capture => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
            StdioMode::Inherit => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!("failed to spawn {label} ({}): {err}", spec.display()))
        })?;

        let pid = child.id();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_lines(label, pid, stdout, None));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_lines(label, pid, stderr, Some(Arc::clone(&stderr_tail))));
        }

        info!(
            label,
            pid = pid.unwrap_or(0),
            command = %spec.display(),
            "child process spawned"
        );

        Ok(Self {
            label,
            child,
            pid,
            started_at: Utc::now(),
            state: ProcessState::Running,
            stderr_tail,
        })
    }

    /// Role label given at spawn time.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// OS process id, if the process has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Spawn timestamp.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Last observed state, without polling.
    #[must_use]
    pub fn last_state(&self) -> ProcessState {
        self.state
    }

    /// Most recent stderr lines (captured mode only).
    #[must_use]
    pub fn recent_stderr(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Non-blocking exit check.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the OS status query fails.
    pub fn poll(&mut self) -> Result<ProcessState> {
        if self.state.is_finished() {
            return Ok(self.state);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(self.record_exit(status)),
            Ok(None) => Ok(ProcessState::Running),
            Err(err) => Err(AppError::Process(format!(
                "failed to poll {}: {err}",
                self.label
            ))),
        }
    }

    /// Wait until the process exits on its own.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if waiting fails.
    pub async fn wait_blocking(&mut self) -> Result<ProcessState> {
        if self.state.is_finished() {
            return Ok(self.state);
        }
        let status = self.child.wait().await.map_err(|err| {
            AppError::Process(format!("failed to wait for {}: {err}", self.label))
        })?;
        Ok(self.record_exit(status))
    }

    /// Request termination, wait up to `grace`, then force-kill.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if waiting on or killing the process fails.
    pub async fn terminate_and_wait(&mut self, grace: Duration) -> Result<TeardownOutcome> {
        let state = self.poll()?;
        if state.is_finished() {
            debug!(label = self.label, ?state, "child already exited before teardown");
            return Ok(TeardownOutcome::AlreadyExited(state));
        }

        info!(
            label = self.label,
            pid = self.pid.unwrap_or(0),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "requesting child termination"
        );
        self.request_terminate();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                let state = self.record_exit(status);
                info!(label = self.label, ?state, "child exited within grace period");
                Ok(TeardownOutcome::Graceful(state))
            }
            Ok(Err(err)) => Err(AppError::Process(format!(
                "failed to wait for {}: {err}",
                self.label
            ))),
            Err(_elapsed) => {
                warn!(
                    label = self.label,
                    "child did not exit within grace period, forcing kill"
                );
                self.child.kill().await.map_err(|err| {
                    AppError::Process(format!("failed to force-kill {}: {err}", self.label))
                })?;
                self.state = ProcessState::Killed;
                Ok(TeardownOutcome::ForceKilled)
            }
        }
    }

    #[cfg(unix)]
    fn request_terminate(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(raw) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => {
                warn!(label = self.label, %err, "failed to send SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) {
        if let Err(err) = self.child.start_kill() {
            warn!(label = self.label, %err, "failed to request termination");
        }
    }

    fn record_exit(&mut self, status: ExitStatus) -> ProcessState {
        let state = ProcessState::from_status(status);
        self.state = state;
        self.pid = None;

        let tail = self.recent_stderr();
        if status.success() {
            info!(label = self.label, ?state, "child process exited");
        } else if tail.is_empty() {
            warn!(label = self.label, ?state, "child process exited unsuccessfully");
        } else {
            warn!(
                label = self.label,
                ?state,
                stderr_tail = %tail.join(" | "),
                "child process exited unsuccessfully"
            );
        }
        state
    }
}

/// Forward each line of a child stream into the log.
async fn drain_lines<R>(
    label: &'static str,
    pid: Option<u32>,
    stream: R,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(ref tail) = tail {
                    warn!(target: "child_output", label, pid = pid.unwrap_or(0), "{line}");
                    if let Ok(mut guard) = tail.lock() {
                        if guard.len() == STDERR_TAIL_LINES {
                            guard.pop_front();
                        }
                        guard.push_back(line);
                    }
                } else {
                    debug!(target: "child_output", label, pid = pid.unwrap_or(0), "{line}");
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(label, %err, "child stream closed with error");
                break;
            }
        }
    }
}
