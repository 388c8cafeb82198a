//! Error types for the entity model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while classifying fields or resolving functional keys.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Type is not registered.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Field is not declared on the type.
    #[error("unknown field {entity_type}.{field}")]
    UnknownField { entity_type: String, field: String },

    /// Type registered twice.
    #[error("type {0} registered twice")]
    DuplicateType(String),

    /// Type is used where a functional key is required but declares none.
    #[error("type {0} declares no key fields")]
    MissingKeyDefinition(String),

    /// Link field points at a type that does not support export.
    #[error("{entity_type}.{field} links to {target}, which does not support export")]
    NotExportable {
        entity_type: String,
        field: String,
        target: String,
    },

    /// A key field (or a hop of a dotted key path) is an unset link.
    #[error("key field {entity_type}.{field} is an unset link")]
    UnsetKeyLink { entity_type: String, field: String },

    /// Key path is not usable as a key (multi-link hop, polymorphic hop, ...).
    #[error("invalid key path {entity_type}.{path}: {reason}")]
    InvalidKeyPath {
        entity_type: String,
        path: String,
        reason: String,
    },

    /// Key definitions reference each other in a loop.
    #[error("key definitions form a cycle through {0}")]
    KeyCycle(String),

    /// Stored value does not match the declared field kind.
    #[error("{entity_type}.{field}: expected {expected}")]
    FieldKindMismatch {
        entity_type: String,
        field: String,
        expected: &'static str,
    },

    /// A stored link points at a record the loader cannot find.
    #[error("linked record {entity_type}/{id} not found")]
    DanglingLink { entity_type: String, id: String },

    /// The entity loader failed.
    #[error("lookup failed: {0}")]
    Lookup(String),
}
