//! End-to-end sessions over a scripted runtime, scripted frontend and
//! in-memory attempt ledger.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use drillbox_core::error::RetryPolicy;
use drillbox_core::fakes::ScriptedRuntime;
use drillbox_core::sandbox::{CliOutput, SandboxConfig, SandboxManager, CONTROL_MOUNT_PATH};
use drillbox_core::scenario::{Category, ScenarioCatalog, ScenarioError};
use drillbox_core::session::{
    ControlHandshake, SessionFrontend, SessionOrchestrator, SessionRequest, SessionSettings,
    TaskBriefing, AGENT_INSTALL_PATH,
};
use drillbox_core::validation::ValidationResult;
use drillbox_core::{DrillError, SandboxError};
use drillbox_state::fakes::MemoryAttemptLedger;
use drillbox_state::{AttemptLedger, StorageError};

// -------------------------------------------------------------------------
// Fixtures
// -------------------------------------------------------------------------

const STORAGE_EASY: &str = r#"
id: sto-001
category: storage
difficulty: easy
task: Create the /srv/data directory
points: 10
setup_commands:
  - mkdir -p /srv
validation:
  checks:
    - type: command
      command: test -d /srv/data
      description: data directory exists
"#;

const NETWORK_HARD: &str = r#"
id: net-009
category: networking
difficulty: hard
task: Configure eth1 and a default route
points: 10
validation:
  checks:
    - type: command
      command: ip link show eth1
    - type: command
      command: ip route show default
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Never,
    AtPresent,
    AtInteract,
}

/// Frontend that records what it was shown and optionally plays the user
/// running `drill-check` once.
struct ScriptedFrontend {
    runtime: Arc<ScriptedRuntime>,
    interrupt: Interrupt,
    ask_progress: bool,
    briefing: Mutex<Option<TaskBriefing>>,
    shell: Mutex<Vec<String>>,
    progress: Mutex<Option<String>>,
    feedback: Mutex<Option<(ValidationResult, u32, u32)>>,
}

impl ScriptedFrontend {
    fn new(runtime: Arc<ScriptedRuntime>) -> Self {
        Self {
            runtime,
            interrupt: Interrupt::Never,
            ask_progress: false,
            briefing: Mutex::new(None),
            shell: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            feedback: Mutex::new(None),
        }
    }

    fn interrupting(mut self, at: Interrupt) -> Self {
        self.interrupt = at;
        self
    }

    fn asking_progress(mut self) -> Self {
        self.ask_progress = true;
        self
    }
}

/// Host side of the control mount of the most recent sandbox.
fn control_dir(runtime: &ScriptedRuntime) -> Option<PathBuf> {
    let suffix = format!(":{CONTROL_MOUNT_PATH}:rw");
    runtime
        .calls_for("run")
        .last()?
        .iter()
        .find_map(|arg| arg.strip_suffix(suffix.as_str()).map(PathBuf::from))
}

#[async_trait]
impl SessionFrontend for ScriptedFrontend {
    async fn present_task(&self, briefing: &TaskBriefing) -> drillbox_core::Result<()> {
        *self.briefing.lock().unwrap() = Some(briefing.clone());
        if self.interrupt == Interrupt::AtPresent {
            return Err(DrillError::Interrupted);
        }
        Ok(())
    }

    async fn interact(&self, shell: &[String]) -> drillbox_core::Result<()> {
        *self.shell.lock().unwrap() = shell.to_vec();

        if self.ask_progress {
            let dir = control_dir(&self.runtime).expect("control directory mounted");
            let handshake = ControlHandshake::new(&dir);
            handshake.post_request().await.unwrap();
            for _ in 0..200 {
                if let Some(text) = handshake.take_response().await {
                    *self.progress.lock().unwrap() = Some(text);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        if self.interrupt == Interrupt::AtInteract {
            return Err(DrillError::Interrupted);
        }
        Ok(())
    }

    async fn show_feedback(&self, result: &ValidationResult, score: u32, max_score: u32) {
        *self.feedback.lock().unwrap() = Some((result.clone(), score, max_score));
    }
}

struct Harness {
    _scenarios: tempfile::TempDir,
    runtime: Arc<ScriptedRuntime>,
    ledger: Arc<MemoryAttemptLedger>,
    orchestrator: SessionOrchestrator,
}

fn harness_with(settings: SessionSettings) -> Harness {
    let scenarios = tempfile::tempdir().unwrap();
    std::fs::write(scenarios.path().join("storage.yaml"), STORAGE_EASY).unwrap();
    std::fs::write(scenarios.path().join("network.yaml"), NETWORK_HARD).unwrap();

    let runtime = Arc::new(ScriptedRuntime::new());
    let ledger = Arc::new(MemoryAttemptLedger::new());
    let orchestrator = SessionOrchestrator::new(
        Arc::new(ScenarioCatalog::new(scenarios.path())),
        SandboxManager::with_runtime(SandboxConfig::default(), runtime.clone()),
        ledger.clone(),
        settings,
    );
    Harness {
        _scenarios: scenarios,
        runtime,
        ledger,
        orchestrator,
    }
}

fn fast_settings() -> SessionSettings {
    SessionSettings {
        monitor_interval: Duration::from_millis(20),
        monitor_join_timeout: Duration::from_millis(500),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        },
        ..SessionSettings::default()
    }
}

fn harness() -> Harness {
    harness_with(fast_settings())
}

fn request(id: &str) -> SessionRequest {
    SessionRequest {
        scenario_id: Some(id.to_string()),
        ..SessionRequest::default()
    }
}

fn assert_torn_down(h: &Harness, control: Option<&Path>) {
    assert!(h.runtime.containers().is_empty(), "sandbox leaked");
    if let Some(dir) = control {
        assert!(!dir.exists(), "control directory leaked: {}", dir.display());
    }
}

// -------------------------------------------------------------------------
// Happy path
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_full_session_scores_persists_and_cleans_up() {
    let h = harness();
    let frontend = ScriptedFrontend::new(h.runtime.clone()).asking_progress();

    let result = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap();

    assert!(result.passed);
    assert_eq!(result.scenario.id, "sto-001");
    assert_eq!((result.score, result.max_score), (10, 10));
    assert_eq!(result.validation_result().checks_total, 1);
    assert_eq!(result.sandbox_id.len(), 64);
    assert!(result.setup_warnings.is_empty());

    let attempt_id = result.attempt_id.clone().expect("attempt recorded");
    let records = h.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempt_id, attempt_id);
    assert_eq!(records[0].category, "storage");
    assert!(records[0].passed);

    let briefing = frontend.briefing.lock().unwrap().clone().unwrap();
    assert!(briefing.check_helper);
    assert!(briefing.sandbox_name.starts_with("drillbox-sto-001-"));

    let shell = frontend.shell.lock().unwrap().clone();
    assert_eq!(shell[..3], ["docker", "exec", "-it"]);

    let progress = frontend.progress.lock().unwrap().clone().expect("progress answered");
    assert!(progress.contains("1/1 checks passed"));
    assert!(progress.contains("PASS: data directory exists"));

    let (shown, score, max) = frontend.feedback.lock().unwrap().clone().unwrap();
    assert_eq!(&shown, result.validation_result());
    assert_eq!((score, max), (10, 10));

    let copies = h.runtime.calls_for("cp");
    assert!(copies[0]
        .last()
        .unwrap()
        .ends_with(&format!(":{AGENT_INSTALL_PATH}")));

    let control = control_dir(&h.runtime).unwrap();
    assert_torn_down(&h, Some(&control));
}

#[tokio::test]
async fn test_partial_credit_uses_difficulty_multiplier() {
    let h = harness();
    h.runtime
        .on_exec("ip route show default", CliOutput::failed(1, ""));
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let result = h
        .orchestrator
        .start_session(request("net-009"), &frontend)
        .await
        .unwrap();

    assert!(!result.passed);
    assert!(!result.verdict.passed());
    assert_eq!(result.validation_result().checks_passed, 1);
    // floor(1/2 * 10 * 2.0) against 10 base points
    assert_eq!((result.score, result.max_score), (10, 10));
    let record = &h.ledger.records()[0];
    assert_eq!((record.score, record.max_score), (10, 10));
    assert_eq!(record.difficulty, "hard");
}

#[tokio::test]
async fn test_hard_pass_records_base_points_as_max() {
    let h = harness();
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let result = h
        .orchestrator
        .start_session(request("net-009"), &frontend)
        .await
        .unwrap();

    assert!(result.passed);
    assert_eq!((result.score, result.max_score), (20, 10));
    let record = &h.ledger.records()[0];
    assert_eq!((record.score, record.max_score), (20, 10));

    let (_, score, max) = frontend.feedback.lock().unwrap().clone().unwrap();
    assert_eq!((score, max), (20, 10));
}

#[tokio::test]
async fn test_runtime_check_records_version_for_snapshots() {
    let h = harness();
    assert!(h.orchestrator.error_handler().snapshot().runtime_version.is_none());

    assert_eq!(h.orchestrator.check_runtime().await.unwrap(), "24.0.7");
    assert_eq!(
        h.orchestrator.error_handler().snapshot().runtime_version.as_deref(),
        Some("24.0.7")
    );
}

#[tokio::test]
async fn test_random_selection_honours_filters() {
    let h = harness();
    let frontend = ScriptedFrontend::new(h.runtime.clone());
    let result = h
        .orchestrator
        .start_session(
            SessionRequest {
                category: Some(Category::Networking),
                ..SessionRequest::default()
            },
            &frontend,
        )
        .await
        .unwrap();
    assert_eq!(result.scenario.id, "net-009");
}

#[tokio::test]
async fn test_sandbox_kept_when_cleanup_disabled() {
    let h = harness_with(SessionSettings {
        cleanup_on_exit: false,
        inject_helper: false,
        ..fast_settings()
    });
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let result = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap();
    assert!(result.passed);
    assert_eq!(h.runtime.containers().len(), 1);
    assert!(h.runtime.calls_for("cp").is_empty());
    assert!(!frontend.briefing.lock().unwrap().clone().unwrap().check_helper);

    let control = control_dir(&h.runtime).unwrap();
    assert!(control.exists());
    std::fs::remove_dir_all(control).unwrap();
}

// -------------------------------------------------------------------------
// Persistence failures
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_lock_contention_is_retried() {
    let h = harness();
    h.ledger.fail_next([
        StorageError::Locked("busy".into()),
        StorageError::Locked("busy".into()),
    ]);
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let result = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap();
    assert!(result.attempt_id.is_some());
    assert_eq!(h.ledger.record_calls(), 3);
}

#[tokio::test]
async fn test_storage_failure_does_not_discard_session() {
    let h = harness();
    h.ledger
        .fail_next([StorageError::Corrupt("bad page".into())]);
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let result = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap();
    assert!(result.passed);
    assert!(result.attempt_id.is_none());
    assert_eq!(h.ledger.record_calls(), 1);
    assert!(h.ledger.records().is_empty());
    assert_torn_down(&h, control_dir(&h.runtime).as_deref());
}

// -------------------------------------------------------------------------
// Error routing
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_interrupt_during_interaction_tears_everything_down() {
    let h = harness();
    let frontend = ScriptedFrontend::new(h.runtime.clone())
        .asking_progress()
        .interrupting(Interrupt::AtInteract);

    let err = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap_err();
    assert!(matches!(err, DrillError::Interrupted));
    assert!(frontend.progress.lock().unwrap().is_some());
    assert!(frontend.feedback.lock().unwrap().is_none());
    assert!(h.ledger.records().is_empty());
    assert_torn_down(&h, control_dir(&h.runtime).as_deref());
}

#[tokio::test]
async fn test_interrupt_while_presenting_tears_down() {
    let h = harness();
    let frontend = ScriptedFrontend::new(h.runtime.clone()).interrupting(Interrupt::AtPresent);

    let err = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap_err();
    assert!(matches!(err, DrillError::Interrupted));
    assert!(frontend.shell.lock().unwrap().is_empty());
    assert_torn_down(&h, control_dir(&h.runtime).as_deref());
}

#[tokio::test]
async fn test_sandbox_creation_failure_surfaces_original_error() {
    let h = harness();
    h.runtime.fail_next(
        "run",
        CliOutput::failed(125, "Conflict. The container name is already in use"),
    );
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let err = h
        .orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DrillError::Sandbox(SandboxError::CreateFailed(_))
    ));
    assert!(frontend.briefing.lock().unwrap().is_none());
    assert_torn_down(&h, control_dir(&h.runtime).as_deref());
}

#[tokio::test]
async fn test_unknown_scenario_never_creates_a_sandbox() {
    let h = harness();
    let frontend = ScriptedFrontend::new(h.runtime.clone());

    let err = h
        .orchestrator
        .start_session(request("nope-404"), &frontend)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DrillError::Scenario(ScenarioError::NotFound(ref id)) if id == "nope-404"
    ));
    assert!(h.runtime.calls_for("run").is_empty());
}

// -------------------------------------------------------------------------
// Queries
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_catalog_and_statistics_queries() {
    let h = harness();
    assert_eq!(
        h.orchestrator.categories().unwrap(),
        vec![Category::Networking, Category::Storage]
    );
    assert_eq!(h.orchestrator.list_scenarios(None, None).unwrap().len(), 2);
    assert_eq!(
        h.orchestrator.get_scenario("net-009").unwrap().points,
        10
    );

    let frontend = ScriptedFrontend::new(h.runtime.clone());
    h.orchestrator
        .start_session(request("sto-001"), &frontend)
        .await
        .unwrap();

    let stats = h.orchestrator.statistics(None).await.unwrap();
    assert_eq!(stats.overall.attempts, 1);
    assert_eq!(stats.overall.passed, 1);
    let networking = h
        .orchestrator
        .statistics(Some(Category::Networking))
        .await
        .unwrap();
    assert_eq!(networking.overall.attempts, 0);

    let listed = h.ledger.list_attempts(Some("sto-001")).await.unwrap();
    assert_eq!(listed.len(), 1);
}
