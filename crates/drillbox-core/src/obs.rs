//! Structured lifecycle events for practice sessions.
//!
//! Every event is an `info!` (or `warn!`) record carrying an `event` field,
//! so JSON log output can be filtered on it directly. Session-scoped records
//! are nested under a [`SessionSpan`].

use tracing::{info, warn};

/// Span tagged with the session id. Attach it to the session future with
/// `Instrument::instrument`, or enter it for synchronous sections.
#[derive(Debug, Clone)]
pub struct SessionSpan {
    span: tracing::Span,
}

impl SessionSpan {
    pub fn new(session_id: &str) -> Self {
        Self {
            span: tracing::info_span!("drillbox.session", session_id = %session_id),
        }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

pub fn emit_session_started(session_id: &str, scenario_id: &str, distribution: &str) {
    info!(
        event = "session.started",
        session_id = %session_id,
        scenario_id = %scenario_id,
        distribution = %distribution,
    );
}

pub fn emit_session_transition(session_id: &str, from: &str, to: &str) {
    info!(event = "session.transition", session_id = %session_id, from = %from, to = %to);
}

pub fn emit_session_finished(session_id: &str, duration_ms: u64, score: u32, passed: bool) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        duration_ms = duration_ms,
        score = score,
        passed = passed,
    );
}

pub fn emit_sandbox_created(name: &str, scenario_id: &str, image: &str) {
    info!(event = "sandbox.created", name = %name, scenario_id = %scenario_id, image = %image);
}

/// `removed` is false when the runtime refused every removal attempt.
pub fn emit_sandbox_destroyed(name: &str, removed: bool) {
    if removed {
        info!(event = "sandbox.destroyed", name = %name);
    } else {
        warn!(event = "sandbox.leaked", name = %name, "container could not be removed");
    }
}

pub fn emit_validation_completed(scenario_id: &str, passed: usize, total: usize) {
    info!(
        event = "validation.completed",
        scenario_id = %scenario_id,
        checks_passed = passed,
        checks_total = total,
    );
}

pub fn emit_progress_check_served(session_id: &str, passed: usize, total: usize) {
    info!(
        event = "session.progress_check",
        session_id = %session_id,
        checks_passed = passed,
        checks_total = total,
    );
}

pub fn emit_teardown_error(session_id: &str, step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "session.teardown_error", session_id = %session_id, step = %step, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_enter() {
        let span = SessionSpan::new("session-1");
        let _guard = span.enter();
        emit_session_transition("session-1", "select_scenario", "create_sandbox");
    }
}
