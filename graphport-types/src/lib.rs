//! Core identity types for graphport.
//!
//! Two notions of identity coexist in every transfer:
//! - [`RecordId`]: the storage-local identifier a repository assigns on
//!   create (UUID v7). Never written into documents.
//! - [`FunctionalKey`]: the business-meaningful, storage-independent
//!   identity of a record, computed from the fields its type declares as key.
//!
//! Everything schema-aware (how keys are computed, which fields are links)
//! lives in `graphport-model`; this crate only defines the values.

mod ids;
mod key;

pub use ids::RecordId;
pub use key::{FunctionalKey, OWNER_KEY_FIELD, ORDINAL_KEY_FIELD, FIELD_KEY_FIELD};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid functional key: {0}")]
    InvalidKey(String),
}
