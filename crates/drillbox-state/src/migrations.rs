//! SurrealDB schema initialization
//!
//! Safe to call on every connection; `DEFINE` statements are idempotent.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::StorageResult;

/// Initialize all drillbox tables.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing drillbox schema");
    init_attempts_table(db).await?;
    Ok(())
}

/// Initialize `attempts` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE attempts {
///   attempt_id:    STRING (unique)
///   scenario_id:   STRING (indexed)
///   category:      STRING (indexed)
///   difficulty:    STRING (indexed)
///   score:         INT
///   max_score:     INT
///   passed:        BOOL
///   duration_secs: INT
///   recorded_at:   DATETIME (indexed)
/// }
/// ```
///
/// Attempts are append-only.
async fn init_attempts_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing attempts table");

    let sql = r#"
        DEFINE TABLE attempts AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_attempt_id ON TABLE attempts COLUMNS attempt_id UNIQUE;
        DEFINE INDEX idx_scenario_id ON TABLE attempts COLUMNS scenario_id;
        DEFINE INDEX idx_category ON TABLE attempts COLUMNS category;
        DEFINE INDEX idx_difficulty ON TABLE attempts COLUMNS difficulty;
        DEFINE INDEX idx_recorded_at ON TABLE attempts COLUMNS recorded_at;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}
