//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key computation failed while matching records.
    #[error("model error: {0}")]
    Model(#[from] graphport_model::ModelError),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Invalid data (dangling link, wrong type, ...).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A post-import handler rejected a record.
    #[error("validation failed for {entity_type} {id}: {message}")]
    Validation {
        entity_type: String,
        id: String,
        message: String,
    },

    /// Transaction misuse (nested begin, commit without begin, ...).
    #[error("transaction error: {0}")]
    Transaction(String),
}
