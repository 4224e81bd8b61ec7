//! `command` checks: exit code, normalised output, regex search.

use async_trait::async_trait;
use regex::Regex;

use super::result::CheckOutcome;
use super::strategy::{misrouted, CheckStrategy};
use crate::environment::Environment;
use crate::scenario::{CheckKind, CommandCheck, ValidationCheck};

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandStrategy;

/// Trim and collapse internal whitespace runs to single spaces.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl CommandStrategy {
    async fn evaluate(&self, env: &dyn Environment, check: &CommandCheck) -> CheckOutcome {
        let result = env.execute(&check.command, None).await;
        let stdout = result.stdout.trim();

        if i64::from(result.exit_code) != check.expected_exit_code {
            return CheckOutcome::fail("Exit code mismatch")
                .expected(format!("exit code {}", check.expected_exit_code))
                .actual(format!("exit code {}", result.exit_code));
        }

        if let Some(expected) = &check.expected_output {
            if normalize_whitespace(&result.stdout) != normalize_whitespace(expected) {
                return CheckOutcome::fail("Output does not match expected")
                    .expected(expected.clone())
                    .actual(stdout);
            }
        }

        if let Some(pattern) = &check.regex_match {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(&result.stdout) => {}
                Ok(_) => {
                    return CheckOutcome::fail("Output does not match regex pattern")
                        .expected(format!("pattern: {pattern}"))
                        .actual(stdout);
                }
                Err(e) => {
                    return CheckOutcome::fail(format!("Invalid regex pattern: {e}"))
                        .expected(format!("pattern: {pattern}"));
                }
            }
        }

        CheckOutcome::pass("Command executed successfully")
    }
}

#[async_trait]
impl CheckStrategy for CommandStrategy {
    fn kind(&self) -> CheckKind {
        CheckKind::Command
    }

    async fn check(&self, env: &dyn Environment, check: &ValidationCheck) -> CheckOutcome {
        match check {
            ValidationCheck::Command(c) => self.evaluate(env, c).await,
            other => misrouted(self.kind(), other),
        }
    }
}
