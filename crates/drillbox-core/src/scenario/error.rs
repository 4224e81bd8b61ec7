//! Errors produced while loading or querying scenarios.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenarios directory not found: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {message}", .path.display())]
    Yaml { path: PathBuf, message: String },

    #[error("invalid scenario {label}: {}", .errors.join("; "))]
    Invalid { label: String, errors: Vec<String> },

    #[error("scenario not found: {0}")]
    NotFound(String),

    #[error("no scenarios match {0}")]
    NoMatch(String),
}

pub type ScenarioResult<T> = std::result::Result<T, ScenarioError>;
