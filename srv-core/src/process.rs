//! Process runner contract.
//!
//! Every external command the workspace issues (container runtime, service
//! managers, `sudo` file edits) goes through a [`ProcessRunner`] so callers can
//! be exercised against a scripted fake. A command that runs and exits
//! non-zero is a normal [`ProcessOutput`], not a [`ProcessError`]; only spawn
//! failures and deadlines are errors.
//!
//! Commands whose failure must never affect the caller's result are issued
//! through [`advisory`], which logs and swallows the outcome explicitly.
//!
//! Run futures are cancellable: dropping one before it resolves kills the
//! child process. Callers race them against their own stop signal.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::constants::IDEMPOTENCY_MARKERS;
use crate::error::ProcessError;

/// A fully described command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            stdin: None,
            timeout: None,
        }
    }

    /// `sudo <program> <args..>`.
    pub fn sudo<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![program.into()];
        all.extend(args.into_iter().map(Into::into));
        Self::new("sudo", all)
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Space-joined command line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Trimmed stdout followed by trimmed stderr.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The command failed only because the target is already in the desired state.
    pub fn is_idempotent_conflict(&self) -> bool {
        !self.success() && has_idempotency_marker(&self.combined())
    }

    /// Convert a non-zero exit into [`ProcessError::Failed`].
    pub fn into_result(self, invocation: &Invocation) -> Result<Self, ProcessError> {
        if self.success() {
            return Ok(self);
        }
        Err(ProcessError::Failed {
            program: invocation.command_line(),
            status: self
                .status
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            output: self.combined(),
        })
    }
}

/// True if `text` contains one of the "already exists" markers.
pub fn has_idempotency_marker(text: &str) -> bool {
    IDEMPOTENCY_MARKERS.iter().any(|m| text.contains(m))
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run with stdout/stderr attached to the terminal. Output fields are empty.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;

    /// Run detached from the terminal with stdin closed, capturing output.
    async fn run_quiet(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;

    /// True if `program` resolves to an executable on `PATH`.
    fn exists(&self, program: &str) -> bool;

    /// [`run_quiet`](Self::run_quiet) that turns a non-zero exit into an error.
    async fn run_checked(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.run_quiet(invocation).await?.into_result(invocation)
    }
}

/// Runs a command whose outcome is informational only. Failures are logged
/// at `warn` and never returned.
pub async fn advisory(runner: &dyn ProcessRunner, invocation: &Invocation) {
    match runner.run_quiet(invocation).await {
        Ok(output) if output.success() => {
            tracing::debug!(command = %invocation.command_line(), "advisory command succeeded");
        }
        Ok(output) => {
            tracing::warn!(
                command = %invocation.command_line(),
                status = ?output.status,
                output = %output.combined(),
                "advisory command failed",
            );
        }
        Err(err) => {
            tracing::warn!(command = %invocation.command_line(), error = %err, "advisory command failed");
        }
    }
}

/// [`ProcessRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn execute(
        invocation: &Invocation,
        mut cmd: Command,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = invocation.program.clone();
        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|source| ProcessError::Io {
                    program: program.clone(),
                    source,
                })?;
            // Dropping stdin closes the pipe so the child sees EOF.
        }

        let wait = child.wait_with_output();
        let output = match invocation.timeout {
            // The child is killed when the timed-out future drops it.
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ProcessError::Timeout {
                    program: program.clone(),
                    timeout: limit,
                })?,
            None => wait.await,
        }
        .map_err(|source| ProcessError::Io { program, source })?;

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn stdin_mode(invocation: &Invocation) -> Stdio {
        if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Self::command(invocation);
        let stdin = if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };
        cmd.stdin(stdin)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Self::execute(invocation, cmd).await
    }

    async fn run_quiet(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Self::command(invocation);
        cmd.stdin(Self::stdin_mode(invocation))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Self::execute(invocation, cmd).await
    }

    fn exists(&self, program: &str) -> bool {
        program_on_path(program).is_some()
    }
}

/// Resolve `program` against `PATH` the way a shell would.
pub fn program_on_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
