//! Score calculation for validated attempts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-difficulty score multipliers.
///
/// Keys are difficulty names (`easy`, `medium`, `hard`). A difficulty with
/// no entry scores with multiplier `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifficultyMultipliers(BTreeMap<String, f64>);

impl DifficultyMultipliers {
    /// Build from explicit `(difficulty, multiplier)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Multiplier for a difficulty, `1.0` when unknown.
    pub fn get(&self, difficulty: &str) -> f64 {
        self.0.get(difficulty).copied().unwrap_or(1.0)
    }

    /// Override one entry.
    pub fn set(&mut self, difficulty: impl Into<String>, multiplier: f64) {
        self.0.insert(difficulty.into(), multiplier);
    }

    /// Iterate over configured entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for DifficultyMultipliers {
    fn default() -> Self {
        Self::new([("easy", 1.0), ("medium", 1.5), ("hard", 2.0)])
    }
}

/// Calculate the score for an attempt.
///
/// Partial credit: the fraction of checks passed scales `max_score`, then the
/// difficulty multiplier applies. The result is truncated toward zero. A
/// scenario with no checks scores `0`.
pub fn calculate_score(
    max_score: u32,
    checks_passed: usize,
    checks_total: usize,
    difficulty: &str,
    multipliers: &DifficultyMultipliers,
) -> u32 {
    if checks_total == 0 {
        return 0;
    }
    let passed = checks_passed.min(checks_total) as f64;
    let base = passed / checks_total as f64 * f64::from(max_score);
    let weighted = base * multipliers.get(difficulty);
    if weighted <= 0.0 {
        0
    } else {
        weighted.floor() as u32
    }
}
