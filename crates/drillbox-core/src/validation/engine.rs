//! The validation engine.
//!
//! Checks run strictly in declaration order, one at a time, against a single
//! [`Environment`]. Given an unchanged environment, two passes produce equal
//! [`ValidationResult`]s.

use std::sync::Arc;

use tracing::debug;

use super::feedback::render_feedback;
use super::result::{CheckOutcome, CheckResult, ValidationResult};
use super::strategy::StrategyRegistry;
use crate::environment::Environment;
use crate::obs;
use crate::scenario::Scenario;

#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<StrategyRegistry>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Engine with every built-in strategy registered.
    pub fn new() -> Self {
        Self::with_strategies(StrategyRegistry::standard())
    }

    pub fn with_strategies(registry: StrategyRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub async fn validate(&self, env: &dyn Environment, scenario: &Scenario) -> ValidationResult {
        let checks = &scenario.validation.checks;
        let mut results = Vec::with_capacity(checks.len());

        for (index, check) in checks.iter().enumerate() {
            let name = check.display_name(index);
            let outcome = match self.registry.get(check.kind()) {
                Some(strategy) => strategy.check(env, check).await,
                None => CheckOutcome::fail(format!(
                    "Unknown or disabled check type: {}",
                    check.kind()
                )),
            };
            debug!(
                scenario_id = %scenario.id,
                check = %name,
                passed = outcome.passed,
                "check evaluated"
            );
            results.push(CheckResult::from_outcome(name, outcome));
        }

        let checks_total = results.len();
        let checks_passed = results.iter().filter(|r| r.passed).count();
        let feedback = render_feedback(&results, checks_passed, checks_total);
        obs::emit_validation_completed(&scenario.id, checks_passed, checks_total);

        ValidationResult {
            passed: checks_passed == checks_total,
            checks_passed,
            checks_total,
            checks: results,
            feedback,
        }
    }
}
