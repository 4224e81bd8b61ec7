//! Error types for the sandbox layer.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("permission denied talking to the container runtime: {0}")]
    PermissionDenied(String),

    #[error("failed to build image {image}: {reason}")]
    ImageBuild { image: String, reason: String },

    #[error("failed to create sandbox: {0}")]
    CreateFailed(String),

    #[error("sandbox {name} is not running")]
    NotRunning { name: String },

    #[error("source path does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("`{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout { .. })
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
