use graphport_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field values of a record, ordered by field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Storage-local pointer to a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkRef {
    pub entity_type: String,
    pub id: RecordId,
}

impl LinkRef {
    pub fn new(entity_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

/// Value held by one field of an [`Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Scalar(Value),
    Link(Option<LinkRef>),
    Links(Vec<LinkRef>),
}

impl FieldValue {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn link(target: &Entity) -> Self {
        Self::Link(Some(target.link()))
    }

    pub fn links<'a>(targets: impl IntoIterator<Item = &'a Entity>) -> Self {
        Self::Links(targets.into_iter().map(Entity::link).collect())
    }
}

/// A persisted record in some storage instance.
///
/// `id` is storage-local; documents identify records by functional key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: RecordId,
    pub entity_type: String,
    pub fields: FieldMap,
}

impl Entity {
    pub fn new(id: RecordId, entity_type: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            fields,
        }
    }

    /// Pointer to this record.
    pub fn link(&self) -> LinkRef {
        LinkRef::new(self.entity_type.clone(), self.id)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Scalar value of a field, if the field holds one.
    pub fn get_scalar(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field) {
            Some(FieldValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// Extract a string scalar.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get_scalar(field).and_then(|v| v.as_str())
    }

    /// Target of a single-link field, if set.
    pub fn get_link(&self, field: &str) -> Option<&LinkRef> {
        match self.fields.get(field) {
            Some(FieldValue::Link(Some(link))) => Some(link),
            _ => None,
        }
    }

    /// Members of a multi-link field; empty when unset.
    pub fn get_links(&self, field: &str) -> &[LinkRef] {
        match self.fields.get(field) {
            Some(FieldValue::Links(links)) => links,
            _ => &[],
        }
    }

    /// Applies `changes` on top of the current field values.
    pub fn apply(&mut self, changes: FieldMap) {
        self.fields.extend(changes);
    }
}
