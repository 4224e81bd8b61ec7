//! In-memory fakes for the ledger contract (testing only)
//!
//! `MemoryAttemptLedger` satisfies the `AttemptLedger` contract without any
//! external dependencies and can be primed to fail, which lets session tests
//! exercise the retry and "persistence failure is non-fatal" paths.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::attempts::{AttemptId, AttemptLedger, AttemptRecord, NewAttempt};
use crate::error::StorageError;
use crate::StorageResult;

/// In-memory attempt ledger backed by a `Vec<AttemptRecord>`.
#[derive(Debug, Default)]
pub struct MemoryAttemptLedger {
    records: Mutex<Vec<AttemptRecord>>,
    queued_failures: Mutex<VecDeque<StorageError>>,
    record_calls: Mutex<u32>,
}

impl MemoryAttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `record_attempt` calls fail with the given errors, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = StorageError>) {
        let mut queue = self.queued_failures.lock().unwrap();
        queue.extend(errors);
    }

    /// Number of `record_attempt` calls seen, including failed ones.
    pub fn record_calls(&self) -> u32 {
        *self.record_calls.lock().unwrap()
    }

    /// Snapshot of stored records in insertion order.
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttemptLedger for MemoryAttemptLedger {
    async fn record_attempt(&self, attempt: NewAttempt) -> StorageResult<AttemptId> {
        *self.record_calls.lock().unwrap() += 1;
        if let Some(err) = self.queued_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let record = AttemptRecord::from_new(attempt);
        let id = record.attempt_id.clone();
        self.records.lock().unwrap().push(record);
        Ok(id)
    }

    async fn list_attempts(&self, scenario_id: Option<&str>) -> StorageResult<Vec<AttemptRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .rev()
            .filter(|r| scenario_id.map_or(true, |id| r.scenario_id == id))
            .cloned()
            .collect())
    }
}
