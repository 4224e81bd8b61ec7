//! [`Environment`] implementation backed by a live sandbox.

use async_trait::async_trait;

use super::manager::{Sandbox, SandboxManager};
use crate::environment::{EnvError, Environment, ExecOutput, FileStat};

/// Binds one sandbox to the four environment operations.
#[derive(Debug, Clone)]
pub struct SandboxEnvironment {
    manager: SandboxManager,
    sandbox: Sandbox,
}

impl SandboxEnvironment {
    pub fn new(manager: SandboxManager, sandbox: Sandbox) -> Self {
        Self { manager, sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    async fn run(&self, command: &str) -> ExecOutput {
        self.execute(command, None).await
    }
}

fn unavailable(out: &ExecOutput) -> EnvError {
    EnvError::Unavailable(out.stderr.clone().unwrap_or_default())
}

#[async_trait]
impl Environment for SandboxEnvironment {
    async fn execute(&self, command: &str, user: Option<&str>) -> ExecOutput {
        let timeout = Some(self.manager.config().command_timeout());
        self.manager
            .execute_as(&self.sandbox, command, user, timeout)
            .await
            .unwrap_or_else(|e| ExecOutput::unavailable(e.to_string()))
    }

    async fn read_file(&self, path: &str) -> Result<String, EnvError> {
        let out = self
            .run(&format!("cat -- {}", shell_words::quote(path)))
            .await;
        match out.exit_code {
            0 => Ok(out.stdout),
            -1 => Err(unavailable(&out)),
            _ => Err(EnvError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        self.run(&format!("test -e {}", shell_words::quote(path)))
            .await
            .succeeded()
    }

    async fn stat(&self, path: &str) -> Result<FileStat, EnvError> {
        let out = self
            .run(&format!(
                "stat -c '%a|%U|%G|%s' -- {}",
                shell_words::quote(path)
            ))
            .await;
        match out.exit_code {
            0 => FileStat::parse(&out.stdout),
            -1 => Err(unavailable(&out)),
            _ => Err(EnvError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}
