//! Error taxonomy for drillbox.
//!
//! [`DrillError`] is the single error type surfaced by the session
//! orchestrator. Every variant maps onto an [`ErrorCategory`] and a
//! [`Severity`]; [`ErrorHandler`] turns that into user-facing guidance.

pub mod handler;
pub mod retry;

use std::fmt;

use serde::{Deserialize, Serialize};

use drillbox_state::StorageError;

use crate::environment::EnvError;
use crate::sandbox::SandboxError;
use crate::scenario::ScenarioError;
use crate::session::SessionState;

pub use handler::{render, DiskUsage, ErrorContext, ErrorHandler, ErrorResponse, HostSnapshot};
pub use retry::{retry_with_backoff, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum DrillError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Environment(#[from] EnvError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("session interrupted by user")]
    Interrupted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for drillbox operations.
pub type Result<T> = std::result::Result<T, DrillError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    SandboxRuntime,
    ScenarioDefinition,
    Validation,
    Persistence,
    Configuration,
    HostSystem,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::SandboxRuntime => "sandbox-runtime",
            ErrorCategory::ScenarioDefinition => "scenario-definition",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Persistence => "persistence",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::HostSystem => "host-system",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The process cannot continue.
    Critical,
    /// The operation failed; the process can continue.
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

impl DrillError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DrillError::Sandbox(SandboxError::SourceMissing(_) | SandboxError::Io(_)) => {
                ErrorCategory::HostSystem
            }
            DrillError::Sandbox(_) => ErrorCategory::SandboxRuntime,
            DrillError::Scenario(_) => ErrorCategory::ScenarioDefinition,
            DrillError::Environment(_) => ErrorCategory::Validation,
            DrillError::Storage(_) => ErrorCategory::Persistence,
            DrillError::Config(_) => ErrorCategory::Configuration,
            DrillError::Io(_) => ErrorCategory::HostSystem,
            DrillError::InvalidTransition { .. } | DrillError::Interrupted => {
                ErrorCategory::Unknown
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DrillError::Sandbox(
                SandboxError::RuntimeUnavailable(_) | SandboxError::PermissionDenied(_),
            ) => Severity::Critical,
            DrillError::Storage(StorageError::Corrupt(_)) => Severity::Critical,
            DrillError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Severity::Critical
            }
            DrillError::Storage(StorageError::Locked(_)) => Severity::Warning,
            DrillError::Interrupted => Severity::Info,
            _ => Severity::Error,
        }
    }

    /// Transient failures worth another attempt: storage lock contention
    /// and runtime timeouts.
    pub fn is_retryable(&self) -> bool {
        match self {
            DrillError::Storage(e) => e.is_contention(),
            DrillError::Sandbox(e) => e.is_timeout(),
            _ => false,
        }
    }
}
