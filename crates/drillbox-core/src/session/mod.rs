//! Practice sessions: lifecycle state machine, the in-sandbox progress
//! check channel and the orchestrator that ties them together.

pub mod control;
pub mod frontend;
pub mod monitor;
pub mod orchestrator;
pub mod state;

pub use control::{ControlChannel, ControlHandshake, AGENT_INSTALL_PATH};
pub use frontend::{SessionFrontend, TaskBriefing};
pub use monitor::{MonitorTask, ValidationGate, ValidationMonitor};
pub use orchestrator::{
    FinalVerdict, SessionOrchestrator, SessionRequest, SessionResult, SessionSettings,
};
pub use state::{SessionMachine, SessionState};
