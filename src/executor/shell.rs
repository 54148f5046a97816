//! Process invocation with capture, timeout and cancellation
//!
//! Every external process the engine starts goes through
//! [`run_captured`]: shell commands and capability tool invocations
//! alike. Output is fully captured; the caller decides what to do
//! with it. A step that overruns its timeout is killed and reported
//! as timed out; a cancellation request grants the child a bounded
//! grace period before the kill.

use crate::executor::context::CancelToken;
use crate::pipeline::StepFailure;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Description of one process to run
#[derive(Debug, Clone)]
pub struct ExecSpec {
    /// Program to launch
    pub program: String,
    /// Arguments, already split
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Environment variables for the child
    pub env: HashMap<String, String>,
    /// Data written to the child's stdin, then closed
    pub stdin: Option<String>,
    /// Maximum wall-clock duration
    pub timeout: Duration,
}

impl ExecSpec {
    /// Creates a spec with empty environment and no stdin
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
            env: HashMap::new(),
            stdin: None,
            timeout: Duration::from_secs(3600),
        }
    }

    /// Builds a spec that runs `command` through the given shell.
    ///
    /// The shell string may carry its own flags, e.g. `bash -eu`.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::Spawn`] when the shell string cannot be
    /// split or is empty.
    pub fn shell(
        shell: &str,
        command: &str,
        cwd: impl Into<PathBuf>,
    ) -> Result<Self, StepFailure> {
        let mut parts = shell_words::split(shell).map_err(|e| StepFailure::Spawn {
            program: shell.to_string(),
            reason: format!("invalid shell: {e}"),
        })?;
        if parts.is_empty() {
            return Err(StepFailure::Spawn {
                program: shell.to_string(),
                reason: "empty shell".to_string(),
            });
        }
        let program = parts.remove(0);
        parts.push("-c".to_string());
        parts.push(command.to_string());
        Ok(Self::new(program, parts, cwd))
    }

    /// Sets the child's environment
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the stdin payload
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Sets the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a captured process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own
    Exited,
    /// The timeout elapsed and the process was killed
    TimedOut,
    /// Cancellation was requested; the process exited within the
    /// grace period or was killed after it
    Cancelled,
}

/// Raw capture of one process invocation
#[derive(Debug, Clone)]
pub struct Capture {
    /// Exit code, when the process ran to completion
    pub exit_code: Option<i32>,
    /// Everything the process wrote to stdout
    pub stdout: String,
    /// Everything the process wrote to stderr
    pub stderr: String,
    /// Wall-clock duration
    pub duration: Duration,
    /// How the invocation ended
    pub termination: Termination,
}

impl Capture {
    /// Returns true for a clean zero exit
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == Some(0)
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}

/// Runs a process to completion, capturing its output.
///
/// Returns the capture even when the process failed, timed out or was
/// cancelled; the only error is a failure to launch at all.
///
/// # Errors
///
/// Returns [`StepFailure::Spawn`] when the program cannot be started.
pub async fn run_captured(
    spec: &ExecSpec,
    cancel: &CancelToken,
    grace: Duration,
) -> Result<Capture, StepFailure> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    tracing::debug!(program = %spec.program, cwd = %spec.cwd.display(), "spawning process");

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| StepFailure::Spawn {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;

    if let Some(input) = &spec.stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let _ = pipe.write_all(input.as_bytes()).await;
            let _ = pipe.shutdown().await;
        }
    }

    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    enum Waited {
        Exited(Option<i32>),
        TimedOut,
        Cancelled,
    }

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status.ok().and_then(|s| s.code())),
        () = tokio::time::sleep(spec.timeout) => Waited::TimedOut,
        () = cancel.cancelled() => Waited::Cancelled,
    };

    let (termination, exit_code) = match waited {
        Waited::Exited(code) => (Termination::Exited, code),
        Waited::TimedOut => {
            tracing::warn!(program = %spec.program, "process timed out, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
            (Termination::TimedOut, None)
        }
        Waited::Cancelled => {
            tracing::info!(program = %spec.program, "cancellation requested");
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => (Termination::Cancelled, status.ok().and_then(|s| s.code())),
                Err(_) => {
                    tracing::warn!(program = %spec.program, "grace period elapsed, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    (Termination::Cancelled, None)
                }
            }
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(Capture {
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
        termination,
    })
}
