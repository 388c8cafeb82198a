//! Functional key resolution and field classification.

use crate::entity::{Entity, FieldValue, LinkRef};
use crate::error::{ModelError, ModelResult};
use crate::registry::SchemaRegistry;
use crate::schema::{CompositionPolicy, FieldClass, FieldDef, FieldKind, LinkTarget};
use graphport_types::FunctionalKey;
use serde_json::Value;

/// Read access to persisted records, used to follow links while
/// computing keys and walking graphs.
pub trait EntityLoader {
    /// Loads the record a link points at; `Ok(None)` if it does not exist.
    fn load(&self, link: &LinkRef) -> ModelResult<Option<Entity>>;
}

/// Computes the functional key of `entity` from its type's key fields.
///
/// Parts are sorted by key field name. A key field holding a link
/// contributes the target's own key (`[type, key]` for polymorphic links);
/// a dotted path contributes the value found at its end.
pub fn compute_key<L>(
    registry: &SchemaRegistry,
    loader: &L,
    entity: &Entity,
) -> ModelResult<FunctionalKey>
where
    L: EntityLoader + ?Sized,
{
    let key_fields = registry.key_fields(&entity.entity_type)?;
    let mut parts = Vec::with_capacity(key_fields.len());
    for path in key_fields {
        let segments: Vec<&str> = path.split('.').collect();
        let value = path_value(registry, loader, entity, &segments)?;
        parts.push((path.clone(), value));
    }
    Ok(FunctionalKey::new(parts))
}

fn path_value<L>(
    registry: &SchemaRegistry,
    loader: &L,
    entity: &Entity,
    segments: &[&str],
) -> ModelResult<Value>
where
    L: EntityLoader + ?Sized,
{
    let Some((head, rest)) = segments.split_first() else {
        return Ok(Value::Null);
    };
    let field = registry.field(&entity.entity_type, head)?;

    match &field.kind {
        FieldKind::Scalar => Ok(entity.get_scalar(head).cloned().unwrap_or(Value::Null)),
        FieldKind::SingleLink { target } => {
            let link = match entity.get(head) {
                Some(FieldValue::Link(Some(link))) => link,
                None | Some(FieldValue::Link(None)) => {
                    return Err(ModelError::UnsetKeyLink {
                        entity_type: entity.entity_type.clone(),
                        field: (*head).to_string(),
                    });
                }
                Some(_) => {
                    return Err(ModelError::FieldKindMismatch {
                        entity_type: entity.entity_type.clone(),
                        field: (*head).to_string(),
                        expected: "a single link",
                    });
                }
            };
            let linked = loader.load(link)?.ok_or_else(|| ModelError::DanglingLink {
                entity_type: link.entity_type.clone(),
                id: link.id.to_string(),
            })?;

            if !rest.is_empty() {
                return path_value(registry, loader, &linked, rest);
            }
            let key = compute_key(registry, loader, &linked)?.to_value();
            Ok(match target {
                LinkTarget::Polymorphic(_) => {
                    Value::Array(vec![Value::String(linked.entity_type.clone()), key])
                }
                LinkTarget::Type(_) => key,
            })
        }
        FieldKind::Composition { .. } | FieldKind::Association { .. } => {
            Err(ModelError::InvalidKeyPath {
                entity_type: entity.entity_type.clone(),
                path: segments.join("."),
                reason: "multi-links cannot be key fields".into(),
            })
        }
    }
}

/// Coarse class of a field.
pub fn classify_field(field: &FieldDef) -> FieldClass {
    match field.kind {
        FieldKind::Scalar => FieldClass::Scalar,
        FieldKind::SingleLink { .. } => FieldClass::SingleLink,
        FieldKind::Composition { .. } | FieldKind::Association { .. } => FieldClass::MultiLink,
    }
}

/// Whether `entity_type.field` is written into documents.
///
/// `Ok(false)` for fields marked `skip_export`; `NotExportable` for a link
/// whose (monomorphic) target type does not support export. Polymorphic
/// targets are checked per value by the exporter.
pub fn is_exportable(registry: &SchemaRegistry, entity_type: &str, field: &str) -> ModelResult<bool> {
    let def = registry.field(entity_type, field)?;
    if def.skip_export {
        return Ok(false);
    }
    let target = match &def.kind {
        FieldKind::Scalar => return Ok(true),
        FieldKind::SingleLink {
            target: LinkTarget::Polymorphic(_),
        } => return Ok(true),
        FieldKind::SingleLink {
            target: LinkTarget::Type(t),
        } => t,
        FieldKind::Composition { target } | FieldKind::Association { target } => target,
    };
    if registry.capabilities(target)?.exportable {
        Ok(true)
    } else {
        Err(ModelError::NotExportable {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            target: target.clone(),
        })
    }
}

/// Reconciliation policy for the members of `entity_type.field`.
pub fn composition_policy(
    registry: &SchemaRegistry,
    entity_type: &str,
    field: &str,
) -> ModelResult<CompositionPolicy> {
    match &registry.field(entity_type, field)?.kind {
        FieldKind::Composition { target } => Ok(registry.capabilities(target)?.composition_policy),
        _ => Err(ModelError::FieldKindMismatch {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            expected: "a composition",
        }),
    }
}
