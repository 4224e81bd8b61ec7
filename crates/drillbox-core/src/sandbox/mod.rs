//! Ephemeral practice containers.
//!
//! The [`SandboxManager`] owns the full lifecycle of each sandbox: image
//! acquisition, launch with setup, command execution, file copy and
//! teardown. It talks to the container runtime only through
//! [`ContainerRuntime`], and exposes each live sandbox to the validation
//! engine as a [`SandboxEnvironment`].

pub mod config;
pub mod environment;
pub mod error;
pub mod manager;
pub mod runtime;

pub use config::SandboxConfig;
pub use environment::SandboxEnvironment;
pub use error::{SandboxError, SandboxResult};
pub use manager::{
    Sandbox, SandboxManager, SetupWarning, CONTROL_MOUNT_PATH, TIMEOUT_EXIT_CODE,
};
pub use runtime::{CliOutput, ContainerRuntime, DockerCli};
