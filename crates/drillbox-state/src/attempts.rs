//! Attempt ledger contract
//!
//! `AttemptLedger` is the narrow record/query surface a practice session
//! persists through. It is async and backend-agnostic; an in-memory fake is
//! provided in the `fakes` module and a SurrealDB implementation in
//! `surreal_ledger`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StorageResult;

/// Unique identifier for a recorded attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub String);

impl AttemptId {
    /// Generate a new random AttemptId
    pub fn new() -> Self {
        AttemptId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An attempt as submitted by the session orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttempt {
    pub scenario_id: String,
    pub category: String,
    pub difficulty: String,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub duration_secs: u64,
}

/// A persisted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: AttemptId,
    pub scenario_id: String,
    pub category: String,
    pub difficulty: String,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub duration_secs: u64,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Stamp a new attempt with an id and the current time.
    pub fn from_new(attempt: NewAttempt) -> Self {
        Self {
            attempt_id: AttemptId::new(),
            scenario_id: attempt.scenario_id,
            category: attempt.category,
            difficulty: attempt.difficulty,
            score: attempt.score,
            max_score: attempt.max_score,
            passed: attempt.passed,
            duration_secs: attempt.duration_secs,
            recorded_at: Utc::now(),
        }
    }
}

/// Aggregates over one slice of attempts (a category or a difficulty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub attempts: u64,
    pub passed: u64,
    pub total_score: u64,
}

impl BucketStats {
    fn add(&mut self, record: &AttemptRecord) {
        self.attempts += 1;
        if record.passed {
            self.passed += 1;
        }
        self.total_score += u64::from(record.score);
    }

    /// Passed attempts over all attempts, `0.0` when empty.
    pub fn pass_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.passed as f64 / self.attempts as f64
        }
    }

    /// Mean score, `0.0` when empty.
    pub fn average_score(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.total_score as f64 / self.attempts as f64
        }
    }
}

/// Summary of recorded progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptStatistics {
    pub overall: BucketStats,
    pub by_category: BTreeMap<String, BucketStats>,
    pub by_difficulty: BTreeMap<String, BucketStats>,
}

impl AttemptStatistics {
    /// Fold a list of records into statistics.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttemptRecord>) -> Self {
        let mut stats = AttemptStatistics::default();
        for record in records {
            stats.overall.add(record);
            stats
                .by_category
                .entry(record.category.clone())
                .or_default()
                .add(record);
            stats
                .by_difficulty
                .entry(record.difficulty.clone())
                .or_default()
                .add(record);
        }
        stats
    }
}

/// Attempt persistence.
///
/// Guarantees:
/// - `record_attempt` returns a fresh id for every call.
/// - `list_attempts` returns newest first.
#[async_trait]
pub trait AttemptLedger: Send + Sync {
    /// Persist one attempt and return its id.
    async fn record_attempt(&self, attempt: NewAttempt) -> StorageResult<AttemptId>;

    /// List attempts, optionally restricted to one scenario.
    async fn list_attempts(&self, scenario_id: Option<&str>) -> StorageResult<Vec<AttemptRecord>>;

    /// Aggregate statistics, optionally restricted to one category.
    async fn statistics(&self, category: Option<&str>) -> StorageResult<AttemptStatistics> {
        let records = self.list_attempts(None).await?;
        Ok(AttemptStatistics::from_records(
            records
                .iter()
                .filter(|r| category.map_or(true, |c| r.category == c)),
        ))
    }
}
