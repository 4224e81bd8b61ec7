//! SurrealDB-backed AttemptLedger implementation
//!
//! Uses `schema::AttemptRow` for persistence, converting to/from
//! `attempts` types at the boundary.

use std::path::Path;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::attempts::{AttemptId, AttemptLedger, AttemptRecord, NewAttempt};
use crate::error::StorageError;
use crate::migrations;
use crate::schema::AttemptRow;
use crate::StorageResult;

const NAMESPACE: &str = "drillbox";
const DATABASE: &str = "progress";

/// SurrealDB-backed implementation of [`AttemptLedger`].
pub struct SurrealAttemptLedger {
    db: Surreal<Any>,
}

impl SurrealAttemptLedger {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `drillbox/progress`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        let ledger = Self::connect("mem://").await?;
        info!("SurrealAttemptLedger connected (in-memory)");
        Ok(ledger)
    }

    /// Open (or create) an on-disk ledger at `path`.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to create database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        let url = format!("surrealkv://{}", path.display());
        let ledger = Self::connect(&url).await?;
        info!("SurrealAttemptLedger connected ({})", url);
        Ok(ledger)
    }

    async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url).await?;
        db.use_ns(NAMESPACE).use_db(DATABASE).await?;
        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl AttemptLedger for SurrealAttemptLedger {
    async fn record_attempt(&self, attempt: NewAttempt) -> StorageResult<AttemptId> {
        let record = AttemptRecord::from_new(attempt);
        let attempt_id = record.attempt_id.clone();
        debug!(attempt_id = %attempt_id, scenario_id = %record.scenario_id, "recording attempt");

        let _created: Option<AttemptRow> = self
            .db
            .create("attempts")
            .content(AttemptRow::from(record))
            .await?;

        Ok(attempt_id)
    }

    async fn list_attempts(&self, scenario_id: Option<&str>) -> StorageResult<Vec<AttemptRecord>> {
        let rows: Vec<AttemptRow> = if let Some(id) = scenario_id {
            let sid = id.to_string();
            let mut res = self
                .db
                .query("SELECT * FROM attempts WHERE scenario_id = $sid ORDER BY recorded_at DESC")
                .bind(("sid", sid))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM attempts ORDER BY recorded_at DESC")
                .await?;
            res.take(0)?
        };

        Ok(rows.into_iter().map(AttemptRecord::from).collect())
    }
}
