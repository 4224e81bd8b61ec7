//! Sandbox lifecycle: acquire image, create, execute, copy, destroy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::config::SandboxConfig;
use super::environment::SandboxEnvironment;
use super::error::{SandboxError, SandboxResult};
use super::runtime::{CliOutput, ContainerRuntime, DockerCli};
use crate::environment::ExecOutput;
use crate::obs;
use crate::scenario::{Distribution, Scenario};

/// Where the host control directory is mounted inside every sandbox.
pub const CONTROL_MOUNT_PATH: &str = "/opt/drillbox/control";

/// Exit code reported when a command exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A setup command that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupWarning {
    /// 0-based position in the scenario's setup list.
    pub index: usize,
    pub command: String,
    pub exit_code: i32,
    pub output: String,
}

/// One live container, exclusively owned by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    /// Runtime-assigned container id.
    pub id: String,
    pub name: String,
    pub scenario_id: String,
    pub distribution: Distribution,
    pub image: String,
    pub control_dir: Option<PathBuf>,
    pub setup_warnings: Vec<SetupWarning>,
}

impl Sandbox {
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Collision-free container name: `drillbox-<scenario id>-<8 hex>`.
fn generate_name(scenario_id: &str) -> String {
    let mut slug: String = scenario_id
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    slug.truncate(40);
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("drillbox-{}-{}", slug, &suffix[..8])
}

fn classify_runtime_failure(out: &CliOutput) -> SandboxError {
    let stderr = out.stderr.trim().to_string();
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") {
        SandboxError::PermissionDenied(stderr)
    } else if lower.contains("cannot connect") || lower.contains("is the docker daemon running") {
        SandboxError::RuntimeUnavailable(stderr)
    } else {
        SandboxError::CreateFailed(stderr)
    }
}

/// Owns every interaction with the container runtime.
#[derive(Clone)]
pub struct SandboxManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<SandboxConfig>,
}

impl std::fmt::Debug for SandboxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxManager {
    /// Manager driving the configured runtime CLI.
    pub fn new(config: SandboxConfig) -> Self {
        let runtime = Arc::new(DockerCli::new(config.runtime_binary.clone()));
        Self::with_runtime(config, runtime)
    }

    pub fn with_runtime(config: SandboxConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Check that the runtime daemon answers. Returns its version string.
    pub async fn ping(&self) -> SandboxResult<String> {
        let limit = self.config.ping_timeout();
        let out = match self
            .runtime
            .invoke(
                &args(["version", "--format", "{{.Server.Version}}"]),
                Some(limit),
            )
            .await
        {
            Ok(out) => out,
            Err(SandboxError::Timeout { .. }) => {
                return Err(SandboxError::RuntimeUnavailable(format!(
                    "no answer from {} within {}s",
                    self.config.runtime_binary,
                    limit.as_secs()
                )))
            }
            Err(e) => return Err(e),
        };

        if !out.success() {
            return Err(match classify_runtime_failure(&out) {
                SandboxError::CreateFailed(msg) => SandboxError::RuntimeUnavailable(msg),
                other => other,
            });
        }
        let version = out.stdout.trim().to_string();
        debug!(version = %version, "container runtime reachable");
        Ok(version)
    }

    /// Make sure the image for `distribution` exists locally, building it
    /// from its recipe if needed.
    pub async fn acquire_image(&self, distribution: Distribution) -> SandboxResult<String> {
        self.acquire_image_with_progress(distribution, &mut |_: &str| {})
            .await
    }

    /// As [`Self::acquire_image`], handing each build output line to
    /// `on_progress`.
    pub async fn acquire_image_with_progress(
        &self,
        distribution: Distribution,
        on_progress: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> SandboxResult<String> {
        let image = self.config.image_for(distribution);

        let inspect = self
            .runtime
            .invoke(
                &args(["image", "inspect", "--format", "{{.Id}}", image.as_str()]),
                Some(self.config.command_timeout()),
            )
            .await?;
        if inspect.success() {
            debug!(image = %image, "image present");
            return Ok(image);
        }

        let context = self.config.recipe_dir_for(distribution);
        let recipe = context.join("Dockerfile");
        if !recipe.is_file() {
            return Err(SandboxError::ImageBuild {
                image,
                reason: format!("no build recipe at {}", recipe.display()),
            });
        }

        info!(image = %image, recipe = %recipe.display(), "building image");
        let build_args = args([
            "build".to_string(),
            "-t".to_string(),
            image.clone(),
            "-f".to_string(),
            recipe.display().to_string(),
            context.display().to_string(),
        ]);

        let mut forward = |line: &str| {
            debug!(image = %image, "{}", line);
            on_progress(line);
        };
        let limit = self.config.build_timeout();
        let status = tokio::time::timeout(limit, self.runtime.stream(&build_args, &mut forward))
            .await
            .map_err(|_| SandboxError::Timeout {
                operation: format!("building {image}"),
                secs: limit.as_secs(),
            })??;

        if status != 0 {
            return Err(SandboxError::ImageBuild {
                image,
                reason: format!("build exited with status {status}"),
            });
        }
        info!(image = %image, "image built");
        Ok(image)
    }

    /// Launch a sandbox for `scenario` and run its setup commands.
    ///
    /// Failing setup commands do not abort creation; they are returned as
    /// [`Sandbox::setup_warnings`].
    pub async fn create(
        &self,
        distribution: Distribution,
        scenario: &Scenario,
        control_dir: Option<&Path>,
    ) -> SandboxResult<Sandbox> {
        let image = self.acquire_image(distribution).await?;
        let name = generate_name(&scenario.id);

        let mut run = args([
            "run",
            "-d",
            "-it",
            "--name",
            name.as_str(),
            "--hostname",
            "drillbox",
            "--network",
            self.config.network.as_str(),
            "--cap-add",
            "SYS_ADMIN",
            "-v",
            "/sys/fs/cgroup:/sys/fs/cgroup:ro",
            "--tmpfs",
            "/run",
            "--tmpfs",
            "/run/lock",
        ]);
        if self.config.privileged {
            run.push("--privileged".to_string());
        }
        if let Some(dir) = control_dir {
            run.push("-v".to_string());
            run.push(format!("{}:{}:rw", dir.display(), CONTROL_MOUNT_PATH));
        }
        run.push("--label".to_string());
        run.push(format!("drillbox.scenario={}", scenario.id));
        run.push(image.clone());

        let out = match self
            .runtime
            .invoke(&run, Some(self.config.command_timeout()))
            .await
        {
            Ok(out) => out,
            Err(e @ SandboxError::Timeout { .. }) => {
                // The daemon may still have created the container.
                warn!(sandbox = %name, "container start timed out; removing any partial container");
                if !self.remove(&name, &["rm", "-f"]).await {
                    warn!(
                        sandbox = %name,
                        "could not remove partial container; remove it manually with `{} rm -f {}`",
                        self.config.runtime_binary,
                        name
                    );
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if !out.success() {
            return Err(classify_runtime_failure(&out));
        }

        let mut sandbox = Sandbox {
            id: out.stdout.trim().to_string(),
            name,
            scenario_id: scenario.id.clone(),
            distribution,
            image,
            control_dir: control_dir.map(Path::to_path_buf),
            setup_warnings: Vec::new(),
        };
        obs::emit_sandbox_created(&sandbox.name, &scenario.id, &sandbox.image);

        if !scenario.setup_commands.is_empty() {
            info!(
                sandbox = %sandbox.name,
                count = scenario.setup_commands.len(),
                "running setup commands"
            );
        }
        for (index, command) in scenario.setup_commands.iter().enumerate() {
            let result = self
                .execute(&sandbox, command, Some(self.config.command_timeout()))
                .await
                .unwrap_or_else(|e| ExecOutput::unavailable(e.to_string()));
            if !result.succeeded() {
                let output = result.stderr.clone().unwrap_or(result.stdout.clone());
                warn!(
                    sandbox = %sandbox.name,
                    command = %command,
                    exit_code = result.exit_code,
                    output = %output.trim(),
                    "setup command failed"
                );
                sandbox.setup_warnings.push(SetupWarning {
                    index,
                    command: command.clone(),
                    exit_code: result.exit_code,
                    output,
                });
            }
        }

        Ok(sandbox)
    }

    /// Whether the runtime reports the sandbox as running.
    pub async fn is_running(&self, sandbox: &Sandbox) -> bool {
        match self
            .runtime
            .invoke(
                &args(["inspect", "-f", "{{.State.Running}}", sandbox.name.as_str()]),
                Some(self.config.command_timeout()),
            )
            .await
        {
            Ok(out) => out.success() && out.stdout.trim() == "true",
            Err(e) => {
                debug!(sandbox = %sandbox.name, error = %e, "inspect failed");
                false
            }
        }
    }

    /// Run `command` inside the sandbox via `/bin/bash -c`.
    pub async fn execute(
        &self,
        sandbox: &Sandbox,
        command: &str,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecOutput> {
        self.execute_as(sandbox, command, None, timeout).await
    }

    pub async fn execute_as(
        &self,
        sandbox: &Sandbox,
        command: &str,
        user: Option<&str>,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecOutput> {
        if !self.is_running(sandbox).await {
            return Err(SandboxError::NotRunning {
                name: sandbox.name.clone(),
            });
        }

        let mut exec = args(["exec"]);
        if let Some(user) = user {
            exec.push("-u".to_string());
            exec.push(user.to_string());
        }
        exec.extend(args([sandbox.name.as_str(), "/bin/bash", "-c", command]));

        match self.runtime.invoke(&exec, timeout).await {
            Ok(out) => Ok(ExecOutput {
                exit_code: out.status,
                stdout: out.stdout,
                stderr: if out.stderr.is_empty() {
                    None
                } else {
                    Some(out.stderr)
                },
            }),
            Err(SandboxError::Timeout { secs, .. }) => {
                warn!(sandbox = %sandbox.name, command = %command, secs, "command timed out");
                Ok(ExecOutput {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: String::new(),
                    stderr: Some(format!("command timed out after {secs}s")),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Copy a host file or directory into the sandbox.
    pub async fn copy_in(&self, sandbox: &Sandbox, source: &Path, dest: &str) -> SandboxResult<()> {
        if !source.exists() {
            return Err(SandboxError::SourceMissing(source.to_path_buf()));
        }
        if !self.is_running(sandbox).await {
            return Err(SandboxError::NotRunning {
                name: sandbox.name.clone(),
            });
        }

        let cp = args([
            "cp".to_string(),
            source.display().to_string(),
            format!("{}:{}", sandbox.name, dest),
        ]);
        let out = self
            .runtime
            .invoke(&cp, Some(self.config.command_timeout()))
            .await?;
        if !out.success() {
            return Err(SandboxError::CommandFailed {
                command: cp.join(" "),
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        debug!(sandbox = %sandbox.name, source = %source.display(), dest, "copied into sandbox");
        Ok(())
    }

    /// Stop and remove the sandbox and its control directory.
    ///
    /// Idempotent and infallible: a container that is already gone counts
    /// as removed, and any remaining failure is logged.
    pub async fn destroy(&self, sandbox: &Sandbox) {
        let limit = Some(Duration::from_secs(self.config.stop_timeout_secs + 5));
        let stop = args([
            "stop".to_string(),
            "-t".to_string(),
            self.config.stop_timeout_secs.to_string(),
            sandbox.name.clone(),
        ]);
        match self.runtime.invoke(&stop, limit).await {
            Ok(out) if out.success() || out.is_no_such_container() => {}
            Ok(out) => {
                debug!(sandbox = %sandbox.name, stderr = %out.stderr.trim(), "stop failed")
            }
            Err(e) => debug!(sandbox = %sandbox.name, error = %e, "stop failed"),
        }

        let mut removed = self.remove(&sandbox.name, &["rm", "-f"]).await;
        if !removed {
            warn!(sandbox = %sandbox.name, "removal failed, retrying with volumes");
            removed = self.remove(&sandbox.name, &["rm", "-f", "-v"]).await;
        }
        if !removed {
            error!(
                sandbox = %sandbox.name,
                "could not remove sandbox; remove it manually with `{} rm -f {}`",
                self.config.runtime_binary,
                sandbox.name
            );
        }

        if let Some(dir) = &sandbox.control_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "could not remove control directory")
                }
            }
        }

        obs::emit_sandbox_destroyed(&sandbox.name, removed);
    }

    async fn remove(&self, name: &str, base: &[&str]) -> bool {
        let mut rm = args(base.iter().copied());
        rm.push(name.to_string());
        match self
            .runtime
            .invoke(&rm, Some(self.config.command_timeout()))
            .await
        {
            Ok(out) => out.success() || out.is_no_such_container(),
            Err(e) => {
                debug!(sandbox = %name, error = %e, "remove failed");
                false
            }
        }
    }

    /// [`crate::Environment`] bound to `sandbox`.
    pub fn environment(&self, sandbox: &Sandbox) -> SandboxEnvironment {
        SandboxEnvironment::new(self.clone(), sandbox.clone())
    }

    /// argv for an interactive shell inside the sandbox.
    pub fn shell_command(&self, sandbox: &Sandbox) -> Vec<String> {
        args([
            self.config.runtime_binary.as_str(),
            "exec",
            "-it",
            sandbox.name.as_str(),
            "/bin/bash",
        ])
    }
}
