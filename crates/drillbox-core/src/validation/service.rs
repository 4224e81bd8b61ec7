//! `service` checks against systemd.

use async_trait::async_trait;

use super::result::CheckOutcome;
use super::strategy::{misrouted, CheckStrategy};
use crate::environment::Environment;
use crate::scenario::{CheckKind, ServiceCheck, ValidationCheck};

#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceStrategy;

/// First line of `systemctl is-*` output, or `unknown` when silent.
fn reported_state(stdout: &str) -> String {
    stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

impl ServiceStrategy {
    async fn evaluate(&self, env: &dyn Environment, check: &ServiceCheck) -> CheckOutcome {
        let unit = shell_words::quote(&check.service_name);
        let name = check.service_name.as_str();

        let active = env
            .execute(&format!("systemctl is-active {unit}"), None)
            .await;
        let active_state = reported_state(&active.stdout);
        let running = active_state == "active";

        let enabled = env
            .execute(&format!("systemctl is-enabled {unit}"), None)
            .await;
        let enabled_state = reported_state(&enabled.stdout);
        // `enabled-runtime` and friends count; `disabled` exits non-zero.
        let is_enabled = enabled.exit_code == 0 && enabled_state.contains("enabled");

        if check.should_be_running && !running {
            return CheckOutcome::fail("Service is not running")
                .expected(format!("{name} active"))
                .actual(format!("{name} {active_state}"));
        }
        if !check.should_be_running && running {
            return CheckOutcome::fail("Service is running but should not be")
                .expected(format!("{name} inactive"))
                .actual(format!("{name} {active_state}"));
        }
        if check.should_be_enabled && !is_enabled {
            return CheckOutcome::fail("Service is not enabled")
                .expected(format!("{name} enabled"))
                .actual(format!("{name} {enabled_state}"));
        }
        if !check.should_be_enabled && is_enabled {
            return CheckOutcome::fail("Service is enabled but should not be")
                .expected(format!("{name} disabled"))
                .actual(format!("{name} {enabled_state}"));
        }

        CheckOutcome::pass("Service validation passed")
    }
}

#[async_trait]
impl CheckStrategy for ServiceStrategy {
    fn kind(&self) -> CheckKind {
        CheckKind::Service
    }

    async fn check(&self, env: &dyn Environment, check: &ValidationCheck) -> CheckOutcome {
        match check {
            ValidationCheck::Service(c) => self.evaluate(env, c).await,
            other => misrouted(self.kind(), other),
        }
    }
}
