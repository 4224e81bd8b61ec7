//! Scenario model, template context and catalog.

pub mod context;
pub mod error;
pub mod loader;
pub mod model;

pub use context::{render, ContextGenerator, TemplateContext};
pub use error::{ScenarioError, ScenarioResult};
pub use loader::ScenarioCatalog;
pub use model::{
    Category, CheckKind, CommandCheck, CustomCheck, Difficulty, Distribution, FileCheck, Scenario,
    ServiceCheck, UnknownVariant, ValidationCheck, ValidationRules,
};
