//! Drillbox-State: attempt persistence and scoring
//!
//! This crate owns everything a practice session hands off once the
//! authoritative validation has run: turning checks passed into a score and
//! recording the attempt so progress can be queried later.
//!
//! ## Key Components
//!
//! - `calculate_score`: difficulty-weighted partial-credit formula
//! - `AttemptLedger`: backend-agnostic record/query contract
//! - `MemoryAttemptLedger`: in-memory fake for tests
//! - `SurrealAttemptLedger`: SurrealDB-backed ledger (`mem://` or `surrealkv://`)

pub mod attempts;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod scoring;
pub mod surreal_ledger;

pub use attempts::{
    AttemptId, AttemptLedger, AttemptRecord, AttemptStatistics, BucketStats, NewAttempt,
};
pub use error::StorageError;
pub use scoring::{calculate_score, DifficultyMultipliers};
pub use surreal_ledger::SurrealAttemptLedger;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
