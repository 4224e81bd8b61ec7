//! The narrow seam between the sandbox manager and the container runtime.
//!
//! Production code drives the `docker` CLI as a child process; tests swap in
//! [`crate::fakes::ScriptedRuntime`].

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::trace;

use super::error::{SandboxError, SandboxResult};

/// Captured output of one runtime invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Whether the runtime reported that the target container is gone.
    pub fn is_no_such_container(&self) -> bool {
        self.stderr.to_lowercase().contains("no such container")
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run the runtime with `args` and collect its output.
    ///
    /// A non-zero exit status is *not* an error; callers inspect
    /// [`CliOutput::status`]. Exceeding `timeout` is.
    async fn invoke(&self, args: &[String], timeout: Option<Duration>) -> SandboxResult<CliOutput>;

    /// Run the runtime with `args`, handing every stdout/stderr line to
    /// `on_line` as it arrives. Returns the exit status.
    async fn stream(
        &self,
        args: &[String],
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> SandboxResult<i32>;
}

/// [`ContainerRuntime`] backed by the docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> SandboxError {
        match e.kind() {
            ErrorKind::NotFound => SandboxError::RuntimeUnavailable(format!(
                "`{}` executable not found on PATH",
                self.binary
            )),
            ErrorKind::PermissionDenied => SandboxError::PermissionDenied(e.to_string()),
            _ => SandboxError::Io(e),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn invoke(&self, args: &[String], timeout: Option<Duration>) -> SandboxResult<CliOutput> {
        trace!(binary = %self.binary, ?args, "invoking container runtime");
        let child = self.command(args).spawn().map_err(|e| self.spawn_error(e))?;

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| SandboxError::Timeout {
                    operation: format!("{} {}", self.binary, args.first().map_or("", |a| a)),
                    secs: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CliOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn stream(
        &self,
        args: &[String],
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> SandboxResult<i32> {
        trace!(binary = %self.binary, ?args, "streaming container runtime");
        let mut child = self.command(args).spawn().map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Io(std::io::Error::other("stderr not captured")))?;

        let mut out = BufReader::new(stdout).lines();
        let mut err = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                line = out.next_line(), if !out_done => match line? {
                    Some(line) => on_line(&line),
                    None => out_done = true,
                },
                line = err.next_line(), if !err_done => match line? {
                    Some(line) => on_line(&line),
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }
}
