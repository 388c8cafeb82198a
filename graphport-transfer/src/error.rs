//! Error taxonomy of the transfer engine.

use crate::document::DocumentError;
use graphport_model::ModelError;
use graphport_storage::StorageError;
use graphport_types::FunctionalKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// A deferred link still waiting for its target when relinking stalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLink {
    pub owner_type: String,
    pub owner_key: FunctionalKey,
    pub field: String,
    pub target_type: String,
    pub target_key: FunctionalKey,
    pub required: bool,
}

impl fmt::Display for PendingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{} -> {} {}{}",
            self.owner_type,
            self.owner_key,
            self.field,
            self.target_type,
            self.target_key,
            if self.required { " (required)" } else { "" }
        )
    }
}

/// Errors raised by exports and imports. All of them abort the call.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed or inconsistent document.
    #[error("invalid document: {0}")]
    Document(#[from] DocumentError),

    /// Link field whose target type does not support export.
    #[error("{entity_type}.{field} links to {target}, which does not support export")]
    NotExportable {
        entity_type: String,
        field: String,
        target: String,
    },

    /// Key lookup matched more than one stored record.
    #[error("key {key} of {entity_type} matches {matches} records")]
    AmbiguousKey {
        entity_type: String,
        key: FunctionalKey,
        matches: usize,
    },

    /// Type used as a link target declares no key fields.
    #[error("type {0} declares no key fields")]
    MissingKeyDefinition(String),

    /// Relinking stopped making progress with links still pending.
    #[error("{} deferred link(s) could not be resolved: {}", .pending.len(), summarize(.pending))]
    UnresolvableCycle { pending: Vec<PendingLink> },

    /// The same record appears twice in one document.
    #[error("record {entity_type} {key} appears more than once")]
    DuplicateRecord {
        entity_type: String,
        key: FunctionalKey,
    },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("unknown field {entity_type}.{field}")]
    UnknownField { entity_type: String, field: String },

    /// A key field is an unset link, so the record has no key.
    #[error("key field {entity_type}.{field} is an unset link")]
    UnsetKeyLink { entity_type: String, field: String },

    /// Export followed links deeper than the configured limit.
    #[error("export depth limit {limit} exceeded at {entity_type}")]
    DepthExceeded { entity_type: String, limit: usize },

    /// Repository failure, propagated unchanged.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Model error without a dedicated variant.
    #[error("model error: {0}")]
    Model(ModelError),

    /// Broken engine invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

fn summarize(pending: &[PendingLink]) -> String {
    pending
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ModelError> for TransferError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::NotExportable {
                entity_type,
                field,
                target,
            } => TransferError::NotExportable {
                entity_type,
                field,
                target,
            },
            ModelError::MissingKeyDefinition(t) => TransferError::MissingKeyDefinition(t),
            ModelError::UnknownType(t) => TransferError::UnknownType(t),
            ModelError::UnknownField { entity_type, field } => {
                TransferError::UnknownField { entity_type, field }
            }
            ModelError::UnsetKeyLink { entity_type, field } => {
                TransferError::UnsetKeyLink { entity_type, field }
            }
            other => TransferError::Model(other),
        }
    }
}

impl From<StorageError> for TransferError {
    fn from(e: StorageError) -> Self {
        match e {
            // Key resolution inside the repository surfaces as model errors.
            StorageError::Model(inner) => inner.into(),
            other => TransferError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::Document(DocumentError::Json(e))
    }
}

/// Error categories surfaced to transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotExportable,
    AmbiguousKey,
    MissingKeyDefinition,
    UnresolvableCycle,
    Persistence,
    InvalidDocument,
    DuplicateRecord,
    UnknownType,
    UnknownField,
    UnsetKeyLink,
    DepthExceeded,
    Internal,
}

/// Serializable error context for the calling transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<FunctionalKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Document(_) => ErrorKind::InvalidDocument,
            TransferError::NotExportable { .. } => ErrorKind::NotExportable,
            TransferError::AmbiguousKey { .. } => ErrorKind::AmbiguousKey,
            TransferError::MissingKeyDefinition(_) => ErrorKind::MissingKeyDefinition,
            TransferError::UnresolvableCycle { .. } => ErrorKind::UnresolvableCycle,
            TransferError::DuplicateRecord { .. } => ErrorKind::DuplicateRecord,
            TransferError::UnknownType(_) => ErrorKind::UnknownType,
            TransferError::UnknownField { .. } => ErrorKind::UnknownField,
            TransferError::UnsetKeyLink { .. } => ErrorKind::UnsetKeyLink,
            TransferError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            TransferError::Storage(_) => ErrorKind::Persistence,
            TransferError::Model(ModelError::DanglingLink { .. } | ModelError::Lookup(_)) => {
                ErrorKind::Persistence
            }
            TransferError::Model(_) | TransferError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Builds the transport-facing report.
    pub fn report(&self) -> ErrorReport {
        let mut report = ErrorReport {
            kind: self.kind(),
            entity_type: None,
            key: None,
            field: None,
            message: self.to_string(),
        };
        match self {
            TransferError::NotExportable {
                entity_type, field, ..
            }
            | TransferError::UnknownField { entity_type, field }
            | TransferError::UnsetKeyLink { entity_type, field } => {
                report.entity_type = Some(entity_type.clone());
                report.field = Some(field.clone());
            }
            TransferError::AmbiguousKey {
                entity_type, key, ..
            }
            | TransferError::DuplicateRecord { entity_type, key } => {
                report.entity_type = Some(entity_type.clone());
                report.key = Some(key.clone());
            }
            TransferError::MissingKeyDefinition(entity_type)
            | TransferError::UnknownType(entity_type)
            | TransferError::DepthExceeded { entity_type, .. } => {
                report.entity_type = Some(entity_type.clone());
            }
            TransferError::UnresolvableCycle { pending } => {
                if let Some(first) = pending.first() {
                    report.entity_type = Some(first.owner_type.clone());
                    report.key = Some(first.owner_key.clone());
                    report.field = Some(first.field.clone());
                }
            }
            TransferError::Storage(StorageError::Validation { entity_type, .. }) => {
                report.entity_type = Some(entity_type.clone());
            }
            TransferError::Document(_)
            | TransferError::Storage(_)
            | TransferError::Model(_)
            | TransferError::Internal(_) => {}
        }
        report
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TransferError::Document(DocumentError::Invalid(message.into()))
    }
}
