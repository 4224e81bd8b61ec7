//! `custom` checks: run a script in the sandbox, judge by exit code.

use async_trait::async_trait;

use super::result::CheckOutcome;
use super::strategy::{misrouted, CheckStrategy};
use crate::environment::Environment;
use crate::scenario::{CheckKind, CustomCheck, ValidationCheck};

#[derive(Debug, Default, Clone, Copy)]
pub struct CustomStrategy;

impl CustomStrategy {
    async fn evaluate(&self, env: &dyn Environment, check: &CustomCheck) -> CheckOutcome {
        let command = shell_words::join(
            std::iter::once(check.script_path.as_str()).chain(check.args.iter().map(String::as_str)),
        );
        let result = env.execute(&command, None).await;

        if i64::from(result.exit_code) == check.expected_exit_code {
            return CheckOutcome::pass("Custom validation script passed");
        }

        let detail = result
            .stderr
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&result.stdout)
            .trim();
        let actual = if detail.is_empty() {
            format!("exit code {}", result.exit_code)
        } else {
            format!("exit code {}: {}", result.exit_code, detail)
        };
        CheckOutcome::fail("Custom validation script failed")
            .expected(format!("exit code {}", check.expected_exit_code))
            .actual(actual)
    }
}

#[async_trait]
impl CheckStrategy for CustomStrategy {
    fn kind(&self) -> CheckKind {
        CheckKind::Custom
    }

    async fn check(&self, env: &dyn Environment, check: &ValidationCheck) -> CheckOutcome {
        match check {
            ValidationCheck::Custom(c) => self.evaluate(env, c).await,
            other => misrouted(self.kind(), other),
        }
    }
}
