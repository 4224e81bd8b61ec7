//! Session lifecycle states and the legal transitions between them.

use std::fmt;

use serde::Serialize;

use crate::error::{DrillError, Result};
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SelectScenario,
    CreateSandbox,
    PresentTask,
    Interactive,
    FinalValidate,
    Score,
    Persist,
    Cleanup,
    Done,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::SelectScenario => "select_scenario",
            SessionState::CreateSandbox => "create_sandbox",
            SessionState::PresentTask => "present_task",
            SessionState::Interactive => "interactive",
            SessionState::FinalValidate => "final_validate",
            SessionState::Score => "score",
            SessionState::Persist => "persist",
            SessionState::Cleanup => "cleanup",
            SessionState::Done => "done",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done)
    }

    /// Successor on the happy path.
    fn next(&self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            SelectScenario => Some(CreateSandbox),
            CreateSandbox => Some(PresentTask),
            PresentTask => Some(Interactive),
            Interactive => Some(FinalValidate),
            FinalValidate => Some(Score),
            Score => Some(Persist),
            Persist => Some(Cleanup),
            Cleanup => Some(Done),
            Error => Some(Cleanup),
            Done => None,
        }
    }

    pub fn can_transition_to(&self, to: SessionState) -> bool {
        if to == SessionState::Error {
            return !matches!(self, SessionState::Done | SessionState::Error);
        }
        self.next() == Some(to)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one session's position in the lifecycle.
#[derive(Debug)]
pub struct SessionMachine {
    session_id: String,
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionMachine {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::SelectScenario,
            history: vec![SessionState::SelectScenario],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state visited so far, in order, including the current one.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn transition(&mut self, to: SessionState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(DrillError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        obs::emit_session_transition(&self.session_id, self.state.as_str(), to.as_str());
        self.state = to;
        self.history.push(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path() {
        let mut machine = SessionMachine::new("s1");
        for to in [
            CreateSandbox,
            PresentTask,
            Interactive,
            FinalValidate,
            Score,
            Persist,
            Cleanup,
            Done,
        ] {
            machine.transition(to).unwrap();
        }
        assert_eq!(machine.state(), Done);
        assert_eq!(machine.history().len(), 9);
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_error_route_goes_through_cleanup() {
        let mut machine = SessionMachine::new("s2");
        machine.transition(CreateSandbox).unwrap();
        machine.transition(Error).unwrap();

        let err = machine.transition(Done).unwrap_err();
        assert!(matches!(
            err,
            DrillError::InvalidTransition {
                from: Error,
                to: Done
            }
        ));

        machine.transition(Cleanup).unwrap();
        machine.transition(Done).unwrap();
        assert_eq!(
            machine.history(),
            &[SelectScenario, CreateSandbox, Error, Cleanup, Done]
        );
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut machine = SessionMachine::new("s3");
        assert!(machine.transition(Score).is_err());
        assert!(machine.transition(SelectScenario).is_err());
        assert_eq!(machine.state(), SelectScenario);

        assert!(!Done.can_transition_to(Error));
        assert!(!Error.can_transition_to(Error));
        assert!(Cleanup.can_transition_to(Error));
    }

    #[test]
    fn test_display_uses_snake_case() {
        assert_eq!(FinalValidate.to_string(), "final_validate");
        assert_eq!(
            serde_json::to_string(&SelectScenario).unwrap(),
            "\"select_scenario\""
        );
    }
}
