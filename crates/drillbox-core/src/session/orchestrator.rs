//! Drives one practice session from scenario selection to teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};

use drillbox_state::{
    calculate_score, AttemptId, AttemptLedger, AttemptStatistics, DifficultyMultipliers,
    NewAttempt, StorageError,
};

use super::control::{ControlChannel, AGENT_INSTALL_PATH};
use super::frontend::{SessionFrontend, TaskBriefing};
use super::monitor::{MonitorTask, ValidationGate, ValidationMonitor};
use super::state::{SessionMachine, SessionState};
use crate::config::DrillConfig;
use crate::environment::Environment;
use crate::error::{
    retry_with_backoff, DrillError, ErrorContext, ErrorHandler, Result, RetryPolicy,
};
use crate::obs::{self, SessionSpan};
use crate::sandbox::{Sandbox, SandboxManager, SetupWarning};
use crate::scenario::{
    Category, Difficulty, Distribution, Scenario, ScenarioCatalog, ScenarioError,
};
use crate::validation::{ValidationResult, Validator};

/// What the user asked to practice. Every field narrows the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRequest {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub distribution: Option<Distribution>,
    /// Run this scenario instead of picking one at random.
    pub scenario_id: Option<String>,
}

/// The one authoritative validation of a session.
///
/// Only the final validation step can build one; progress checks served
/// to `drill-check` never become a verdict and are never scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalVerdict(ValidationResult);

impl FinalVerdict {
    pub(crate) fn new(result: ValidationResult) -> Self {
        Self(result)
    }

    pub fn result(&self) -> &ValidationResult {
        &self.0
    }

    pub fn passed(&self) -> bool {
        self.0.passed
    }

    pub fn into_inner(self) -> ValidationResult {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: String,
    pub scenario: Arc<Scenario>,
    pub verdict: FinalVerdict,
    pub score: u32,
    /// The scenario's base points, before the difficulty multiplier.
    pub max_score: u32,
    pub duration: Duration,
    pub passed: bool,
    pub sandbox_id: String,
    /// `None` when the attempt could not be recorded.
    pub attempt_id: Option<AttemptId>,
    pub setup_warnings: Vec<SetupWarning>,
}

impl SessionResult {
    pub fn validation_result(&self) -> &ValidationResult {
        self.verdict.result()
    }
}

/// Tunables for the session driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub monitor_interval: Duration,
    pub monitor_join_timeout: Duration,
    pub inject_helper: bool,
    /// When false a finished session leaves its sandbox running. Sessions
    /// that fail are always torn down.
    pub cleanup_on_exit: bool,
    pub retry: RetryPolicy,
    pub multipliers: DifficultyMultipliers,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_millis(500),
            monitor_join_timeout: Duration::from_secs(1),
            inject_helper: true,
            cleanup_on_exit: true,
            retry: RetryPolicy::default(),
            multipliers: DifficultyMultipliers::default(),
        }
    }
}

/// Resources a session has acquired so far; released on every exit path.
#[derive(Default)]
struct Acquired {
    control: Option<ControlChannel>,
    sandbox: Option<Sandbox>,
    monitor: Option<ValidationMonitor>,
}

pub struct SessionOrchestrator {
    catalog: Arc<ScenarioCatalog>,
    sandboxes: SandboxManager,
    validator: Validator,
    ledger: Arc<dyn AttemptLedger>,
    errors: ErrorHandler,
    settings: SessionSettings,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("scenarios", &self.catalog.root())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    pub fn new(
        catalog: Arc<ScenarioCatalog>,
        sandboxes: SandboxManager,
        ledger: Arc<dyn AttemptLedger>,
        settings: SessionSettings,
    ) -> Self {
        let errors = ErrorHandler::new(sandboxes.config().runtime_binary.clone());
        Self {
            catalog,
            sandboxes,
            validator: Validator::new(),
            ledger,
            errors,
            settings,
        }
    }

    /// Orchestrator for `config`, driving the real container runtime.
    pub fn from_config(config: &DrillConfig, ledger: Arc<dyn AttemptLedger>) -> Self {
        Self::new(
            Arc::new(ScenarioCatalog::new(config.scenarios_dir.clone())),
            SandboxManager::new(config.sandbox.clone()),
            ledger,
            config.session_settings(),
        )
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn sandboxes(&self) -> &SandboxManager {
        &self.sandboxes
    }

    pub fn error_handler(&self) -> &ErrorHandler {
        &self.errors
    }

    /// Confirm the container runtime answers and remember its version for
    /// host snapshots attached to later critical errors.
    pub async fn check_runtime(&self) -> Result<String> {
        let version = self.sandboxes.ping().await?;
        self.errors.record_runtime_version(version.clone());
        Ok(version)
    }

    // ---------------------------------------------------------------------
    // Catalog and history queries
    // ---------------------------------------------------------------------

    pub fn list_scenarios(
        &self,
        category: Option<Category>,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Arc<Scenario>>> {
        Ok(self.catalog.list(category, difficulty)?)
    }

    pub fn get_scenario(&self, id: &str) -> Result<Arc<Scenario>> {
        self.catalog
            .get(id)?
            .ok_or_else(|| ScenarioError::NotFound(id.to_string()).into())
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.catalog.categories()?)
    }

    pub async fn statistics(&self, category: Option<Category>) -> Result<AttemptStatistics> {
        Ok(self
            .ledger
            .statistics(category.as_ref().map(Category::as_str))
            .await?)
    }

    // ---------------------------------------------------------------------
    // Session driver
    // ---------------------------------------------------------------------

    /// Run one complete session.
    ///
    /// On failure every acquired resource is released before the original
    /// error is returned.
    pub async fn start_session(
        &self,
        request: SessionRequest,
        frontend: &dyn SessionFrontend,
    ) -> Result<SessionResult> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let span = SessionSpan::new(&session_id);
        self.run(session_id, request, frontend)
            .instrument(span.span())
            .await
    }

    async fn run(
        &self,
        session_id: String,
        request: SessionRequest,
        frontend: &dyn SessionFrontend,
    ) -> Result<SessionResult> {
        let started = Instant::now();
        let mut machine = SessionMachine::new(session_id.as_str());
        let mut acquired = Acquired::default();

        let err = match self
            .drive(&session_id, &request, frontend, &mut machine, &mut acquired, started)
            .await
        {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        let mut context = ErrorContext::new()
            .action("practice session")
            .with("session_id", &session_id)
            .with("state", machine.state());
        if let Some(id) = &request.scenario_id {
            context = context.scenario(id.clone());
        }
        if let Some(sandbox) = &acquired.sandbox {
            context = context.scenario(sandbox.scenario_id.clone()).sandbox(sandbox.name.clone());
        }
        self.errors.handle(&err, &context);

        if let Err(e) = machine.transition(SessionState::Error) {
            debug!(error = %e, "session already past error routing");
        }
        if machine.state() == SessionState::Error {
            let _ = machine.transition(SessionState::Cleanup);
        }
        self.teardown(&session_id, &mut acquired, true).await;
        if machine.state() == SessionState::Cleanup {
            let _ = machine.transition(SessionState::Done);
        }
        Err(err)
    }

    async fn drive(
        &self,
        session_id: &str,
        request: &SessionRequest,
        frontend: &dyn SessionFrontend,
        machine: &mut SessionMachine,
        acquired: &mut Acquired,
        started: Instant,
    ) -> Result<SessionResult> {
        // SelectScenario
        let scenario = self.select(request)?;
        let distribution = self.resolve_distribution(&scenario, request);
        obs::emit_session_started(session_id, &scenario.id, distribution.as_str());

        machine.transition(SessionState::CreateSandbox)?;
        let control = acquired.control.insert(ControlChannel::create()?);
        let handshake = control.handshake();
        let sandbox = self
            .sandboxes
            .create(distribution, &scenario, Some(control.path()))
            .await?;
        let sandbox = acquired.sandbox.insert(sandbox).clone();
        let check_helper = if self.settings.inject_helper {
            self.inject_helper(&sandbox, acquired).await
        } else {
            false
        };

        machine.transition(SessionState::PresentTask)?;
        let briefing = TaskBriefing {
            scenario: scenario.clone(),
            sandbox_name: sandbox.name.clone(),
            setup_warnings: sandbox.setup_warnings.clone(),
            check_helper,
        };
        frontend.present_task(&briefing).await?;

        machine.transition(SessionState::Interactive)?;
        let environment: Arc<dyn Environment> = Arc::new(self.sandboxes.environment(&sandbox));
        let gate: ValidationGate = Arc::new(Mutex::new(()));
        acquired.monitor = Some(ValidationMonitor::spawn(MonitorTask {
            session_id: session_id.to_string(),
            handshake,
            environment: environment.clone(),
            scenario: scenario.clone(),
            validator: self.validator.clone(),
            gate: gate.clone(),
            interval: self.settings.monitor_interval,
        }));
        let interaction = frontend
            .interact(&self.sandboxes.shell_command(&sandbox))
            .await;
        if let Some(monitor) = acquired.monitor.take() {
            let served = monitor.stop(self.settings.monitor_join_timeout).await;
            debug!(served, "progress checks answered");
        }
        interaction?;

        machine.transition(SessionState::FinalValidate)?;
        let verdict = {
            let _slot = gate.lock().await;
            FinalVerdict::new(self.validator.validate(environment.as_ref(), &scenario).await)
        };

        machine.transition(SessionState::Score)?;
        let result = verdict.result();
        let difficulty = scenario.difficulty.as_str();
        // Recorded against the scenario's base points; a passing hard
        // scenario can score above it.
        let max_score = scenario.points;
        let score = calculate_score(
            scenario.points,
            result.checks_passed,
            result.checks_total,
            difficulty,
            &self.settings.multipliers,
        );
        frontend.show_feedback(result, score, max_score).await;

        machine.transition(SessionState::Persist)?;
        let duration = started.elapsed();
        let attempt = NewAttempt {
            scenario_id: scenario.id.clone(),
            category: scenario.category.as_str().to_string(),
            difficulty: difficulty.to_string(),
            score,
            max_score,
            passed: verdict.passed(),
            duration_secs: duration.as_secs(),
        };
        let attempt_id = self.persist(attempt, &sandbox).await;

        machine.transition(SessionState::Cleanup)?;
        self.teardown(session_id, acquired, self.settings.cleanup_on_exit)
            .await;
        machine.transition(SessionState::Done)?;

        let passed = verdict.passed();
        obs::emit_session_finished(session_id, duration.as_millis() as u64, score, passed);
        Ok(SessionResult {
            session_id: session_id.to_string(),
            scenario,
            verdict,
            score,
            max_score,
            duration,
            passed,
            sandbox_id: sandbox.id.clone(),
            attempt_id,
            setup_warnings: sandbox.setup_warnings,
        })
    }

    fn select(&self, request: &SessionRequest) -> Result<Arc<Scenario>> {
        match &request.scenario_id {
            Some(id) => self.get_scenario(id),
            None => Ok(self.catalog.pick_random(
                request.category,
                request.difficulty,
                request.distribution,
            )?),
        }
    }

    /// A scenario pinned to a distribution always runs there; otherwise the
    /// request decides, then the configured default.
    fn resolve_distribution(&self, scenario: &Scenario, request: &SessionRequest) -> Distribution {
        match (scenario.distribution, request.distribution) {
            (Some(fixed), Some(asked)) if fixed != asked => {
                warn!(
                    scenario_id = %scenario.id,
                    requested = %asked,
                    using = %fixed,
                    "scenario requires a specific distribution"
                );
                fixed
            }
            (Some(fixed), _) => fixed,
            (None, Some(asked)) => asked,
            (None, None) => self.sandboxes.config().default_distribution,
        }
    }

    /// Install `drill-check` in the sandbox. Failure only disables the helper.
    async fn inject_helper(&self, sandbox: &Sandbox, acquired: &Acquired) -> bool {
        let Some(control) = &acquired.control else {
            return false;
        };
        let staged = match control.write_agent() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "could not stage drill-check helper");
                return false;
            }
        };
        if let Err(e) = self
            .sandboxes
            .copy_in(sandbox, &staged, AGENT_INSTALL_PATH)
            .await
        {
            warn!(sandbox = %sandbox.name, error = %e, "could not install drill-check helper");
            return false;
        }
        match self
            .sandboxes
            .execute(sandbox, &format!("chmod 755 {AGENT_INSTALL_PATH}"), None)
            .await
        {
            Ok(out) if out.succeeded() => true,
            Ok(out) => {
                warn!(exit_code = out.exit_code, "could not make drill-check executable");
                false
            }
            Err(e) => {
                warn!(error = %e, "could not make drill-check executable");
                false
            }
        }
    }

    /// Record the attempt. Failures are reported and swallowed so a
    /// validated session is never lost to storage trouble.
    async fn persist(&self, attempt: NewAttempt, sandbox: &Sandbox) -> Option<AttemptId> {
        let recorded = retry_with_backoff(
            &self.settings.retry,
            || self.ledger.record_attempt(attempt.clone()),
            StorageError::is_contention,
        )
        .await;

        match recorded {
            Ok(id) => {
                info!(attempt_id = %id.0, score = attempt.score, "attempt recorded");
                Some(id)
            }
            Err(e) => {
                let context = ErrorContext::new()
                    .action("record attempt")
                    .scenario(attempt.scenario_id.clone())
                    .sandbox(sandbox.name.clone())
                    .with("score", attempt.score);
                self.errors.handle(&DrillError::Storage(e), &context);
                None
            }
        }
    }

    /// Release everything in `acquired`. Never fails; problems are logged.
    async fn teardown(&self, session_id: &str, acquired: &mut Acquired, destroy: bool) {
        if let Some(monitor) = acquired.monitor.take() {
            monitor.stop(self.settings.monitor_join_timeout).await;
        }

        if let Some(sandbox) = acquired.sandbox.take() {
            if destroy {
                self.sandboxes.destroy(&sandbox).await;
            } else {
                info!(
                    sandbox = %sandbox.name,
                    "leaving sandbox running; remove it with `{} rm -f {}`",
                    self.sandboxes.config().runtime_binary,
                    sandbox.name
                );
                if let Some(control) = acquired.control.take() {
                    control.persist();
                }
            }
        }

        if let Some(control) = acquired.control.take() {
            if let Err(e) = control.close() {
                if e.kind() != std::io::ErrorKind::NotFound {
                    obs::emit_teardown_error(session_id, "control directory", &e);
                }
            }
        }
    }
}
