//! Drillbox-Core: hands-on Linux administration practice in throwaway
//! containers.
//!
//! ## Key Components
//!
//! - `scenario`: task definitions, templating and the lazily loaded catalog
//! - `environment`: the four-operation capability checks run against
//! - `sandbox`: container lifecycle through the runtime CLI
//! - `validation`: strategy-dispatched checks and feedback rendering
//! - `session`: the session state machine, progress-check monitor and
//!   orchestrator
//! - `error`: error taxonomy, handler and retry policy
//! - `config`, `telemetry`, `obs`: configuration and structured logging

pub mod config;
pub mod environment;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod sandbox;
pub mod scenario;
pub mod session;
pub mod telemetry;
pub mod validation;

pub use config::DrillConfig;
pub use environment::{EnvError, Environment, ExecOutput, FileStat};
pub use error::{DrillError, ErrorCategory, ErrorContext, ErrorHandler, ErrorResponse, Result, Severity};
pub use sandbox::{Sandbox, SandboxConfig, SandboxError, SandboxManager};
pub use scenario::{Category, Difficulty, Distribution, Scenario, ScenarioCatalog, ScenarioError};
pub use session::{
    SessionFrontend, SessionOrchestrator, SessionRequest, SessionResult, SessionState, TaskBriefing,
};
pub use validation::{ValidationResult, Validator};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
