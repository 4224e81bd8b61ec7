//! Classifies failures, logs them with context and produces remediation
//! guidance for the user.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use drillbox_state::StorageError;

use super::{DrillError, ErrorCategory, Severity};
use crate::sandbox::SandboxError;
use crate::scenario::ScenarioError;

/// Request-scoped facts about what was happening when an error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub scenario_id: Option<String>,
    pub sandbox_id: Option<String>,
    pub user_action: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.user_action = Some(action.into());
        self
    }

    pub fn scenario(mut self, id: impl Into<String>) -> Self {
        self.scenario_id = Some(id.into());
        self
    }

    pub fn sandbox(mut self, id: impl Into<String>) -> Self {
        self.sandbox_id = Some(id.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.extra.insert(key.into(), value.to_string());
        self
    }

    fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(id) = &self.scenario_id {
            parts.push(format!("scenario={id}"));
        }
        if let Some(id) = &self.sandbox_id {
            parts.push(format!("sandbox={id}"));
        }
        if let Some(action) = &self.user_action {
            parts.push(format!("action={action}"));
        }
        parts.extend(self.extra.iter().map(|(k, v)| format!("{k}={v}")));
        if parts.is_empty() {
            "no context".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// What the caller should tell the user and do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub category: ErrorCategory,
    pub severity: Severity,
    /// The raw error text.
    pub message: String,
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub can_retry: bool,
    pub should_exit: bool,
}

/// Space on the filesystem holding one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    /// Measure the filesystem containing `path`.
    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    pub fn of(path: &Path) -> std::io::Result<Self> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        // SAFETY: statvfs is plain old data; an all-zero value is valid.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is NUL-terminated and stat outlives the call.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let block = stat.f_frsize as u64;
        let total_bytes = stat.f_blocks as u64 * block;
        let free_bytes = stat.f_bavail as u64 * block;
        let used_bytes = total_bytes.saturating_sub(stat.f_bfree as u64 * block);
        Ok(Self {
            total_bytes,
            used_bytes,
            free_bytes,
        })
    }

    #[cfg(not(unix))]
    pub fn of(_path: &Path) -> std::io::Result<Self> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk usage is only measured on unix hosts",
        ))
    }

    pub fn percent_used(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Host facts logged alongside critical errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub pid: u32,
    pub cwd: Option<String>,
    pub runtime_socket_present: bool,
    /// Server version reported by the container runtime, once it answered.
    pub runtime_version: Option<String>,
    /// Usage of the filesystem holding the working directory.
    pub disk: Option<DiskUsage>,
}

impl HostSnapshot {
    pub fn capture(runtime_version: Option<String>) -> Self {
        let cwd = std::env::current_dir().ok();
        let disk = DiskUsage::of(cwd.as_deref().unwrap_or_else(|| Path::new("/"))).ok();
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            pid: std::process::id(),
            cwd: cwd.map(|p| p.display().to_string()),
            runtime_socket_present: Path::new("/var/run/docker.sock").exists(),
            runtime_version,
            disk,
        }
    }
}

/// Stateless error classifier and logger.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    runtime_binary: String,
    runtime_version: Arc<OnceCell<String>>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ErrorHandler {
    pub fn new(runtime_binary: impl Into<String>) -> Self {
        Self {
            runtime_binary: runtime_binary.into(),
            runtime_version: Arc::new(OnceCell::new()),
        }
    }

    /// Remember the runtime's server version for later host snapshots.
    /// Only the first recorded version is kept.
    pub fn record_runtime_version(&self, version: impl Into<String>) {
        let _ = self.runtime_version.set(version.into());
    }

    /// Host facts as they stand now.
    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot::capture(self.runtime_version.get().cloned())
    }

    /// Classify, log and explain `error`.
    pub fn handle(&self, err: &DrillError, context: &ErrorContext) -> ErrorResponse {
        let response = self.explain(err);
        self.log(err, context, &response);
        response
    }

    /// Classify and explain `error` without logging it.
    pub fn explain(&self, err: &DrillError) -> ErrorResponse {
        let severity = err.severity();
        ErrorResponse {
            category: err.category(),
            severity,
            message: err.to_string(),
            user_message: self.user_message(err),
            suggestions: self.suggestions(err),
            can_retry: err.is_retryable(),
            should_exit: severity == Severity::Critical,
        }
    }

    fn log(&self, err: &DrillError, context: &ErrorContext, response: &ErrorResponse) {
        let ctx = context.summary();
        match response.severity {
            Severity::Critical => {
                let host = self.snapshot();
                let disk = host.disk.unwrap_or_default();
                error!(
                    category = %response.category,
                    severity = %response.severity,
                    context = %ctx,
                    os = %host.os,
                    arch = %host.arch,
                    cpus = host.cpus,
                    pid = host.pid,
                    cwd = host.cwd.as_deref().unwrap_or("?"),
                    runtime_socket_present = host.runtime_socket_present,
                    runtime_version = host.runtime_version.as_deref().unwrap_or("unknown"),
                    disk_total_bytes = disk.total_bytes,
                    disk_free_bytes = disk.free_bytes,
                    disk_percent_used = disk.percent_used(),
                    error = ?err,
                    "{}",
                    response.message
                );
            }
            Severity::Error => error!(
                category = %response.category,
                context = %ctx,
                error = ?err,
                "{}",
                response.message
            ),
            Severity::Warning => warn!(
                category = %response.category,
                context = %ctx,
                "{}",
                response.message
            ),
            Severity::Info => info!(
                category = %response.category,
                context = %ctx,
                "{}",
                response.message
            ),
        }
    }

    fn user_message(&self, err: &DrillError) -> String {
        let rt = &self.runtime_binary;
        match err {
            DrillError::Sandbox(e) => match e {
                SandboxError::RuntimeUnavailable(_) => format!(
                    "The container runtime ({rt}) is not running or not reachable.\n\
                     Practice sandboxes cannot be created without it."
                ),
                SandboxError::PermissionDenied(_) => format!(
                    "Permission denied when talking to {rt}.\n\
                     Your user account may not be allowed to use the container runtime."
                ),
                SandboxError::ImageBuild { image, .. } => format!(
                    "The sandbox image {image} is not available and could not be built."
                ),
                SandboxError::Timeout { .. } => format!(
                    "A {rt} operation timed out.\n\
                     The sandbox may be taking too long to start or respond."
                ),
                SandboxError::SourceMissing(path) => {
                    format!("File not found: {}\nA required file is missing.", path.display())
                }
                other => format!("Sandbox error: {other}"),
            },
            DrillError::Scenario(e) => match e {
                ScenarioError::Yaml { .. } => format!(
                    "Failed to parse a scenario file.\n\
                     There is a syntax error in the definition.\n{e}"
                ),
                ScenarioError::NoMatch(filters) => format!(
                    "No scenarios found matching {filters}.\n\
                     Try different filters or check that scenario files exist."
                ),
                ScenarioError::Invalid { .. } => {
                    format!("Scenario definition is incomplete.\n{e}")
                }
                ScenarioError::RootMissing(path) => format!(
                    "The scenarios directory {} does not exist.",
                    path.display()
                ),
                other => format!("Scenario error: {other}"),
            },
            DrillError::Environment(e) => format!(
                "Failed to inspect the sandbox during validation.\n\
                 The sandbox may not be responding.\nError: {e}"
            ),
            DrillError::Storage(e) => match e {
                StorageError::Locked(_) => "The progress database is locked by another process.\n\
                     Another drillbox instance may be running."
                    .to_string(),
                StorageError::Corrupt(_) => "The progress database is corrupted.\n\
                     Your recorded progress may need to be repaired or reset."
                    .to_string(),
                other => format!("Database error: {other}"),
            },
            DrillError::Config(msg) => {
                format!("Configuration error: {msg}\nCheck your drillbox.toml and DRILLBOX_* variables.")
            }
            DrillError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => format!(
                "Permission denied: {e}\nYou do not have permission to access this resource."
            ),
            DrillError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                format!("File not found: {e}\nA required file or directory is missing.")
            }
            DrillError::Io(e) => format!("System error: {e}"),
            DrillError::Interrupted => "Session interrupted.".to_string(),
            DrillError::InvalidTransition { .. } => {
                format!("An unexpected error occurred: {err}")
            }
        }
    }

    fn suggestions(&self, err: &DrillError) -> Vec<String> {
        let rt = &self.runtime_binary;
        match err {
            DrillError::Sandbox(e) => match e {
                SandboxError::RuntimeUnavailable(_) => vec![
                    format!("Start the daemon: sudo systemctl start {rt}"),
                    format!("Check the daemon status: {rt} ps"),
                    format!("Verify the installation: {rt} --version"),
                ],
                SandboxError::PermissionDenied(_) => vec![
                    format!("Add your user to the {rt} group: sudo usermod -aG {rt} $USER"),
                    "Log out and back in for group changes to take effect".to_string(),
                    format!("Check socket permissions: ls -l /var/run/{rt}.sock"),
                ],
                SandboxError::ImageBuild { image, .. } => vec![
                    "Check that the images/<distribution>/Dockerfile recipe exists".to_string(),
                    format!("Pull or build the image manually: {rt} build -t {image} ..."),
                    format!("List available images: {rt} images"),
                ],
                SandboxError::Timeout { .. } => vec![
                    "Wait a moment and try again".to_string(),
                    format!("Check daemon logs: journalctl -u {rt}"),
                    "Check system resources: top or htop".to_string(),
                ],
                SandboxError::NotRunning { name } => vec![
                    format!("Check the container state: {rt} ps -a --filter name={name}"),
                    format!("Inspect container logs: {rt} logs {name}"),
                ],
                _ => vec![
                    format!("Check daemon logs: journalctl -u {rt}"),
                    format!("Restart the {rt} daemon"),
                ],
            },
            DrillError::Scenario(e) => match e {
                ScenarioError::Yaml { .. } => vec![
                    "Check YAML syntax in the scenario file".to_string(),
                    "Ensure indentation uses spaces, not tabs".to_string(),
                    "Lint the file: drillbox lint <file>".to_string(),
                ],
                ScenarioError::NoMatch(_) => vec![
                    "List available scenarios: drillbox list".to_string(),
                    "Try a different category, difficulty or distribution".to_string(),
                    "Check that scenario files have a .yaml or .yml extension".to_string(),
                ],
                ScenarioError::Invalid { .. } => vec![
                    "Review the scenario file structure".to_string(),
                    "Lint the file: drillbox lint <file>".to_string(),
                ],
                _ => vec![
                    "Check that scenarios_dir points at your scenario tree".to_string(),
                    "Check logs for detailed error information".to_string(),
                ],
            },
            DrillError::Environment(_) => vec![
                format!("Check that the sandbox is running: {rt} ps"),
                "Try running the validation commands manually in the sandbox".to_string(),
            ],
            DrillError::Storage(e) => match e {
                StorageError::Locked(_) => vec![
                    "Wait a moment and try again".to_string(),
                    "Close other drillbox instances".to_string(),
                ],
                StorageError::Corrupt(_) => vec![
                    "Back up the database directory before changing anything".to_string(),
                    "Reset progress by removing the database directory (loses all progress)"
                        .to_string(),
                ],
                _ => vec![
                    "Check that the database directory is writable".to_string(),
                    "Consider resetting the database if the issue persists".to_string(),
                ],
            },
            DrillError::Config(_) => vec![
                "Check configuration file syntax (TOML)".to_string(),
                "Verify paths and values are correct".to_string(),
                "Override individual values with DRILLBOX_* environment variables".to_string(),
            ],
            DrillError::Io(_) => vec![
                "Check that required files and directories exist".to_string(),
                "Check file and directory permissions".to_string(),
            ],
            DrillError::Interrupted | DrillError::InvalidTransition { .. } => Vec::new(),
        }
    }
}

/// Format a response for a terminal.
pub fn render(response: &ErrorResponse) -> String {
    let rule = "=".repeat(70);
    let title = response.category.as_str().replace('-', " ").to_uppercase();

    let mut lines = vec![
        rule.clone(),
        format!("{}: {}", response.severity.to_string().to_uppercase(), title),
        rule.clone(),
        String::new(),
        response.user_message.clone(),
    ];
    if !response.suggestions.is_empty() {
        lines.push(String::new());
        lines.push("RECOVERY SUGGESTIONS:".to_string());
        lines.extend(
            response
                .suggestions
                .iter()
                .enumerate()
                .map(|(i, s)| format!("  {}. {}", i + 1, s)),
        );
    }
    if response.can_retry {
        lines.push(String::new());
        lines.push("This operation can be retried.".to_string());
    }
    lines.push(String::new());
    lines.push(rule);
    lines.join("\n")
}
