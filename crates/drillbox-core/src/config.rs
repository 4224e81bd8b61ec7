//! Application configuration.
//!
//! Sources, later ones winning: built-in defaults, a TOML file (explicit
//! path, or `./drillbox.toml` when present), then `DRILLBOX_*` environment
//! variables. The merged result is validated before use.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use drillbox_state::DifficultyMultipliers;

use crate::error::{DrillError, Result, RetryPolicy};
use crate::sandbox::SandboxConfig;
use crate::scenario::Distribution;
use crate::session::SessionSettings;

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "drillbox.toml";

const ENV_PREFIX: &str = "DRILLBOX_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillConfig {
    pub scenarios_dir: PathBuf,
    /// SurrealKV directory for attempt history. `None` keeps history in
    /// memory for the lifetime of the process.
    pub database_path: Option<PathBuf>,
    pub sandbox: SandboxConfig,
    pub scoring: ScoringConfig,
    pub session: SessionConfig,
    pub retry: RetryPolicy,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            database_path: Some(PathBuf::from(".drillbox/attempts")),
            sandbox: SandboxConfig::default(),
            scoring: ScoringConfig::default(),
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub multipliers: DifficultyMultipliers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often the monitor looks for a progress-check request.
    pub monitor_interval_ms: u64,
    /// How long teardown waits for the monitor before aborting it.
    pub monitor_join_timeout_ms: u64,
    /// Install `drill-check` inside each sandbox.
    pub inject_helper: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 500,
            monitor_join_timeout_ms: 1000,
            inject_helper: true,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DrillError::Config(format!("{ENV_PREFIX}{key}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DrillError::Config(format!(
            "{ENV_PREFIX}{key}: expected a boolean, got '{other}'"
        ))),
    }
}

impl DrillConfig {
    /// Load from `path`, or from `./drillbox.toml` if it exists, then apply
    /// the process environment and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DrillError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&text)
            .map_err(|e| DrillError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DrillError::Config(e.to_string()))
    }

    /// Apply `DRILLBOX_*` overrides from `vars`. Unrelated keys are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "SCENARIOS_DIR" => self.scenarios_dir = PathBuf::from(value),
                "DATABASE_PATH" => {
                    self.database_path = if value.trim().is_empty() {
                        None
                    } else {
                        Some(PathBuf::from(value))
                    }
                }
                "RUNTIME" => self.sandbox.runtime_binary = value,
                "IMAGE_PREFIX" => self.sandbox.image_prefix = value,
                "DISTRIBUTION" => {
                    self.sandbox.default_distribution = parse_env::<Distribution>(key, &value)?
                }
                "NETWORK" => self.sandbox.network = value,
                "PRIVILEGED" => self.sandbox.privileged = parse_bool(key, &value)?,
                "RECIPES_DIR" => self.sandbox.recipes_dir = PathBuf::from(value),
                "CLEANUP" => self.sandbox.cleanup_on_exit = parse_bool(key, &value)?,
                "COMMAND_TIMEOUT" => self.sandbox.command_timeout_secs = parse_env(key, &value)?,
                "PING_TIMEOUT" => self.sandbox.ping_timeout_secs = parse_env(key, &value)?,
                "MONITOR_INTERVAL_MS" => {
                    self.session.monitor_interval_ms = parse_env(key, &value)?
                }
                "INJECT_HELPER" => self.session.inject_helper = parse_bool(key, &value)?,
                "RETRY_ATTEMPTS" => self.retry.max_attempts = parse_env(key, &value)?,
                "RETRY_BASE_DELAY_MS" => self.retry.base_delay_ms = parse_env(key, &value)?,
                // DRILLBOX_LOG is read by the tracing setup.
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.sandbox.runtime_binary.trim().is_empty() {
            problems.push("sandbox.runtime_binary must not be empty".to_string());
        }
        if self.sandbox.image_prefix.trim().is_empty() {
            problems.push("sandbox.image_prefix must not be empty".to_string());
        }
        for (name, secs) in [
            ("sandbox.command_timeout_secs", self.sandbox.command_timeout_secs),
            ("sandbox.ping_timeout_secs", self.sandbox.ping_timeout_secs),
            ("sandbox.build_timeout_secs", self.sandbox.build_timeout_secs),
            ("session.monitor_interval_ms", self.session.monitor_interval_ms),
        ] {
            if secs == 0 {
                problems.push(format!("{name} must be greater than zero"));
            }
        }
        for name in self.sandbox.images.keys() {
            if name.parse::<Distribution>().is_err() {
                problems.push(format!("sandbox.images: unknown distribution '{name}'"));
            }
        }
        for (difficulty, multiplier) in self.scoring.multipliers.iter() {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                problems.push(format!(
                    "scoring.multipliers.{difficulty} must be a positive number"
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DrillError::Config(problems.join("; ")))
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            monitor_interval: Duration::from_millis(self.session.monitor_interval_ms),
            monitor_join_timeout: Duration::from_millis(self.session.monitor_join_timeout_ms),
            inject_helper: self.session.inject_helper,
            cleanup_on_exit: self.sandbox.cleanup_on_exit,
            retry: self.retry,
            multipliers: self.scoring.multipliers.clone(),
        }
    }
}
