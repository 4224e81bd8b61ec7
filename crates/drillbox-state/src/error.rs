//! Error types for drillbox-state

use thiserror::Error;

/// Errors produced by an attempt ledger backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store is held by another writer; safe to retry.
    #[error("database is locked: {0}")]
    Locked(String),

    /// The store is unreadable or its contents are malformed.
    #[error("database is corrupt: {0}")]
    Corrupt(String),

    /// Requested record does not exist.
    #[error("attempt not found: {attempt_id}")]
    NotFound { attempt_id: String },

    /// Connection or query failure reported by the backend.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the failure is transient contention worth retrying.
    pub fn is_contention(&self) -> bool {
        matches!(self, StorageError::Locked(_))
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("locked") {
            StorageError::Locked(msg)
        } else if lower.contains("corrupt") || lower.contains("malformed") {
            StorageError::Corrupt(msg)
        } else {
            StorageError::Backend(msg)
        }
    }
}
