//! SurrealDB row mapping for attempts.

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempts::{AttemptId, AttemptRecord};

/// One row of the `attempts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub attempt_id: String,
    pub scenario_id: String,
    pub category: String,
    pub difficulty: String,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub duration_secs: u64,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl From<AttemptRecord> for AttemptRow {
    fn from(record: AttemptRecord) -> Self {
        AttemptRow {
            id: None,
            attempt_id: record.attempt_id.0,
            scenario_id: record.scenario_id,
            category: record.category,
            difficulty: record.difficulty,
            score: record.score,
            max_score: record.max_score,
            passed: record.passed,
            duration_secs: record.duration_secs,
            recorded_at: record.recorded_at,
        }
    }
}

impl From<AttemptRow> for AttemptRecord {
    fn from(row: AttemptRow) -> Self {
        AttemptRecord {
            attempt_id: AttemptId(row.attempt_id),
            scenario_id: row.scenario_id,
            category: row.category,
            difficulty: row.difficulty,
            score: row.score,
            max_score: row.max_score,
            passed: row.passed,
            duration_secs: row.duration_secs,
            recorded_at: row.recorded_at,
        }
    }
}
