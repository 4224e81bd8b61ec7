//! Check strategies and the kind-keyed registry that dispatches to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::CommandStrategy;
use super::custom::CustomStrategy;
use super::file::FileStrategy;
use super::result::CheckOutcome;
use super::service::ServiceStrategy;
use crate::environment::Environment;
use crate::scenario::{CheckKind, ValidationCheck};

/// Evaluates one kind of check against an environment.
#[async_trait]
pub trait CheckStrategy: Send + Sync {
    fn kind(&self) -> CheckKind;

    async fn check(&self, env: &dyn Environment, check: &ValidationCheck) -> CheckOutcome;
}

/// Outcome for a check handed to a strategy of a different kind.
pub(crate) fn misrouted(expected: CheckKind, check: &ValidationCheck) -> CheckOutcome {
    CheckOutcome::fail(format!(
        "{} check routed to {} strategy",
        check.kind().as_str(),
        expected.as_str()
    ))
}

/// One strategy per check kind.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<CheckKind, Arc<dyn CheckStrategy>>,
}

impl StrategyRegistry {
    /// Empty registry; every check fails closed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the four built-in strategies.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CommandStrategy));
        registry.register(Arc::new(FileStrategy));
        registry.register(Arc::new(ServiceStrategy));
        registry.register(Arc::new(CustomStrategy));
        registry
    }

    /// Register `strategy` under its own kind, replacing any previous one.
    pub fn register(&mut self, strategy: Arc<dyn CheckStrategy>) -> &mut Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    /// Disable a kind; its checks will fail closed.
    pub fn remove(&mut self, kind: CheckKind) -> &mut Self {
        self.strategies.remove(&kind);
        self
    }

    pub fn get(&self, kind: CheckKind) -> Option<&Arc<dyn CheckStrategy>> {
        self.strategies.get(&kind)
    }

    pub fn kinds(&self) -> Vec<CheckKind> {
        let mut kinds: Vec<CheckKind> = self.strategies.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_covers_every_kind() {
        assert_eq!(StrategyRegistry::standard().kinds(), CheckKind::ALL.to_vec());
    }

    #[test]
    fn test_remove_disables_kind() {
        let mut registry = StrategyRegistry::standard();
        registry.remove(CheckKind::Custom);
        assert!(registry.get(CheckKind::Custom).is_none());
        assert!(registry.get(CheckKind::File).is_some());
    }
}
