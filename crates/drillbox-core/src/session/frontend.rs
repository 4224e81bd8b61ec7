//! The user-facing side of a session, injected into the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::sandbox::SetupWarning;
use crate::scenario::Scenario;
use crate::validation::ValidationResult;

/// Everything the user needs before starting work.
#[derive(Debug, Clone)]
pub struct TaskBriefing {
    pub scenario: Arc<Scenario>,
    pub sandbox_name: String,
    pub setup_warnings: Vec<SetupWarning>,
    /// Whether `drill-check` is available inside the sandbox.
    pub check_helper: bool,
}

/// Presentation and interaction hooks.
///
/// `present_task` and `interact` are the only points where a session may be
/// cancelled; an implementation signals that by returning
/// [`crate::DrillError::Interrupted`].
#[async_trait]
pub trait SessionFrontend: Send + Sync {
    async fn present_task(&self, briefing: &TaskBriefing) -> Result<()>;

    /// Hand the terminal to the user. `shell` is the argv of an interactive
    /// shell inside the sandbox. Returns once the user leaves it.
    async fn interact(&self, shell: &[String]) -> Result<()>;

    async fn show_feedback(&self, result: &ValidationResult, score: u32, max_score: u32);
}
