//! Sandbox manager configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scenario::Distribution;

/// How sandboxes are built, launched and torn down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container runtime executable.
    pub runtime_binary: String,
    /// Fallback image name is `<image_prefix>-<distribution>:latest`.
    pub image_prefix: String,
    /// Explicit image per distribution name; overrides the prefix rule.
    pub images: BTreeMap<String, String>,
    pub default_distribution: Distribution,
    pub network: String,
    pub privileged: bool,
    /// Holds `<distribution>/Dockerfile` build recipes.
    pub recipes_dir: PathBuf,
    /// Destroy the sandbox when the session ends.
    pub cleanup_on_exit: bool,
    pub command_timeout_secs: u64,
    pub ping_timeout_secs: u64,
    pub build_timeout_secs: u64,
    /// Grace period given to `stop` before the runtime kills the container.
    pub stop_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime_binary: "docker".to_string(),
            image_prefix: "drillbox".to_string(),
            images: BTreeMap::new(),
            default_distribution: Distribution::Ubuntu,
            network: "bridge".to_string(),
            privileged: true,
            recipes_dir: PathBuf::from("images"),
            cleanup_on_exit: true,
            command_timeout_secs: 30,
            ping_timeout_secs: 10,
            build_timeout_secs: 1800,
            stop_timeout_secs: 10,
        }
    }
}

impl SandboxConfig {
    /// Pinned image name for `distribution`.
    pub fn image_for(&self, distribution: Distribution) -> String {
        self.images
            .get(distribution.as_str())
            .cloned()
            .unwrap_or_else(|| format!("{}-{}:latest", self.image_prefix, distribution))
    }

    pub fn recipe_dir_for(&self, distribution: Distribution) -> PathBuf {
        self.recipes_dir.join(distribution.as_str())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}
