//! Core entity model for graphport.
//!
//! Defines the types the exporter and importer reason about:
//! - [`Entity`]: a persisted record (storage id, type, typed field values)
//! - [`TypeSchema`] / [`FieldDef`]: a type's fields, key fields and export capability
//! - [`FieldKind`]: closed classification of a field: scalar, single link,
//!   composition or association
//! - [`SchemaRegistry`]: the per-type capability table, built once at registration
//! - [`Exportable`]: the trait a business type implements to take part in transfers
//! - [`ImportHandler`]: optional per-type validation / derived-field hook
//!
//! The functional key resolver ([`compute_key`], [`classify_field`],
//! [`is_exportable`]) follows links through the [`EntityLoader`] seam, so this
//! crate never depends on a concrete storage engine.

mod entity;
mod error;
mod handler;
mod registry;
mod resolver;
mod schema;

pub use entity::{Entity, FieldMap, FieldValue, LinkRef};
pub use error::{ModelError, ModelResult};
pub use handler::ImportHandler;
pub use registry::{Capabilities, Exportable, SchemaRegistry, SchemaRegistryBuilder};
pub use resolver::{
    classify_field, composition_policy, compute_key, is_exportable, EntityLoader,
};
pub use schema::{
    CompositionPolicy, FieldClass, FieldDef, FieldKind, LinkTarget, Requirement, TypeSchema,
};

pub use graphport_types::{FunctionalKey, RecordId};
