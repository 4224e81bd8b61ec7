//! Per-check and aggregate validation results.

use serde::{Deserialize, Serialize};

/// What a strategy decided about one check. The engine attaches the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl CheckResult {
    pub fn from_outcome(name: impl Into<String>, outcome: CheckOutcome) -> Self {
        Self {
            name: name.into(),
            passed: outcome.passed,
            message: outcome.message,
            expected: outcome.expected,
            actual: outcome.actual,
        }
    }
}

/// Aggregate of one validation pass over every check of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `true` iff every check passed.
    pub passed: bool,
    pub checks_passed: usize,
    pub checks_total: usize,
    pub checks: Vec<CheckResult>,
    pub feedback: String,
}

impl ValidationResult {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}
