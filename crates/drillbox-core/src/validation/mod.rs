//! Strategy-dispatched validation of sandbox state.

pub mod command;
pub mod custom;
pub mod engine;
pub mod feedback;
pub mod file;
pub mod result;
pub mod service;
pub mod strategy;

pub use command::CommandStrategy;
pub use custom::CustomStrategy;
pub use engine::Validator;
pub use feedback::render_feedback;
pub use file::FileStrategy;
pub use result::{CheckOutcome, CheckResult, ValidationResult};
pub use service::ServiceStrategy;
pub use strategy::{CheckStrategy, StrategyRegistry};
