//! Scenario and check records.
//!
//! Everything here is immutable once the loader has produced it. Enumerated
//! fields (category, difficulty, distribution, check kind) are closed enums;
//! the loader rejects definitions that use any other value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Skill area a scenario exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Networking,
    Storage,
    UsersGroups,
    OperationsDeployment,
    EssentialCommands,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Networking,
        Category::Storage,
        Category::UsersGroups,
        Category::OperationsDeployment,
        Category::EssentialCommands,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Networking => "networking",
            Category::Storage => "storage",
            Category::UsersGroups => "users_groups",
            Category::OperationsDeployment => "operations_deployment",
            Category::EssentialCommands => "essential_commands",
        }
    }
}

/// Scenario difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Linux distribution a sandbox image is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Ubuntu,
    Centos,
    Rocky,
}

impl Distribution {
    pub const ALL: [Distribution; 3] = [
        Distribution::Ubuntu,
        Distribution::Centos,
        Distribution::Rocky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Distribution::Ubuntu => "ubuntu",
            Distribution::Centos => "centos",
            Distribution::Rocky => "rocky",
        }
    }
}

/// Error returned when a string is not a member of one of the closed enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} must be one of: {allowed}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub allowed: String,
}

macro_rules! closed_enum_parse {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        allowed: <$ty>::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_enum_parse!(Category, "category");
closed_enum_parse!(Difficulty, "difficulty");
closed_enum_parse!(Distribution, "distribution");

fn default_true() -> bool {
    true
}

/// Run a command and inspect its exit code and stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCheck {
    pub command: String,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub expected_exit_code: i64,
    #[serde(default)]
    pub regex_match: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Assert existence, metadata and content of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCheck {
    pub path: String,
    #[serde(default = "default_true")]
    pub should_exist: bool,
    /// Octal mode such as `"0644"`; compared with leading zeros stripped.
    #[serde(default)]
    pub permissions: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub content_contains: Option<String>,
    #[serde(default)]
    pub content_regex: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Assert a systemd unit's active and enabled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub service_name: String,
    #[serde(default = "default_true")]
    pub should_be_running: bool,
    #[serde(default = "default_true")]
    pub should_be_enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Run a validation script inside the sandbox; pass/fail by exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCheck {
    pub script_path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub expected_exit_code: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Discriminant of [`ValidationCheck`], used as the strategy lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Command,
    File,
    Service,
    Custom,
}

impl CheckKind {
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Command,
        CheckKind::File,
        CheckKind::Service,
        CheckKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Command => "command",
            CheckKind::File => "file",
            CheckKind::Service => "service",
            CheckKind::Custom => "custom",
        }
    }
}

closed_enum_parse!(CheckKind, "check type");

/// One declarative assertion about sandbox state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationCheck {
    Command(CommandCheck),
    File(FileCheck),
    Service(ServiceCheck),
    Custom(CustomCheck),
}

impl ValidationCheck {
    pub fn kind(&self) -> CheckKind {
        match self {
            ValidationCheck::Command(_) => CheckKind::Command,
            ValidationCheck::File(_) => CheckKind::File,
            ValidationCheck::Service(_) => CheckKind::Service,
            ValidationCheck::Custom(_) => CheckKind::Custom,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ValidationCheck::Command(c) => c.description.as_deref(),
            ValidationCheck::File(c) => c.description.as_deref(),
            ValidationCheck::Service(c) => c.description.as_deref(),
            ValidationCheck::Custom(c) => c.description.as_deref(),
        }
    }

    /// Display name: the description, or `Check N` for the 0-based `index`.
    pub fn display_name(&self, index: usize) -> String {
        match self.description() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => format!("Check {}", index + 1),
        }
    }
}

/// Ordered checks that together decide whether a scenario is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub checks: Vec<ValidationCheck>,
}

/// A practice task plus the checks that verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub task: String,
    pub points: u32,
    /// `None` means the scenario runs on any distribution.
    #[serde(default)]
    pub distribution: Option<Distribution>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Seconds.
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub validation: ValidationRules,
}

impl Scenario {
    /// Whether this scenario may run on `distribution`.
    pub fn supports(&self, distribution: Distribution) -> bool {
        self.distribution.map_or(true, |d| d == distribution)
    }

    pub fn check_count(&self) -> usize {
        self.validation.checks.len()
    }
}
