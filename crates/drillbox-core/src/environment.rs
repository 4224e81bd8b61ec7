//! The capability surface validation runs against.
//!
//! Check strategies only ever see an [`Environment`]; they never know
//! whether they are talking to a container, a fake, or anything else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of running one command in an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: Option<String>,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: None,
        }
    }

    /// Synthetic failure for when the command could not be run at all.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: Some(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Ownership and mode of a path as reported by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Octal mode without leading zeros, e.g. `"644"`.
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub size: u64,
}

impl FileStat {
    /// Parse one line of `stat -c '%a|%U|%G|%s'` output.
    pub fn parse(line: &str) -> Result<Self, EnvError> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        match parts.as_slice() {
            [perms, owner, group, size] => Ok(Self {
                permissions: (*perms).to_string(),
                owner: (*owner).to_string(),
                group: (*group).to_string(),
                size: size
                    .parse()
                    .map_err(|_| EnvError::Parse(format!("invalid size in stat output: {line}")))?,
            }),
            _ => Err(EnvError::Parse(format!("unexpected stat output: {line}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    #[error("no such file: {path}")]
    NotFound { path: String },

    #[error("environment unavailable: {0}")]
    Unavailable(String),

    #[error("could not parse environment output: {0}")]
    Parse(String),
}

/// Four operations, nothing else.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Run `command` through `/bin/bash -c`, optionally as `user`.
    ///
    /// Never fails: an unreachable target yields `exit_code = -1`.
    async fn execute(&self, command: &str, user: Option<&str>) -> ExecOutput;

    async fn read_file(&self, path: &str) -> Result<String, EnvError>;

    async fn exists(&self, path: &str) -> bool;

    async fn stat(&self, path: &str) -> Result<FileStat, EnvError>;
}
