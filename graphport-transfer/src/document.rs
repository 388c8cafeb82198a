//! Wire document codec.
//!
//! A document is a JSON array of records:
//!
//! ```json
//! [{"__type__": "package", "_key": [["code", "P1"]], "name": "Starter", "items": [...]}]
//! ```
//!
//! Field values stay as raw JSON in [`Record`]; what they mean depends on
//! the field kind, so the importer decodes them with [`LinkPayload`] and
//! [`MultiPayload`] once it knows the schema.

use graphport_types::FunctionalKey;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Member carrying the record's type tag.
pub const TYPE_FIELD: &str = "__type__";
/// Member carrying the record's functional key.
pub const KEY_FIELD: &str = "_key";

/// Result type for document decoding.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors raised while decoding documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> DocumentError {
    DocumentError::Invalid(message.into())
}

fn parse_key(value: &Value) -> DocumentResult<FunctionalKey> {
    FunctionalKey::from_value(value).map_err(|e| invalid(e.to_string()))
}

/// One serialized record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub entity_type: String,
    /// Empty for composition members whose key is implied by position.
    pub key: FunctionalKey,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(entity_type: impl Into<String>, key: FunctionalKey) -> Self {
        Self {
            entity_type: entity_type.into(),
            key,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn from_value(value: &Value) -> DocumentResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid(format!("expected a record object, got {value}")))?;
        let entity_type = match object.get(TYPE_FIELD) {
            Some(Value::String(t)) if !t.is_empty() => t.clone(),
            _ => return Err(invalid(format!("record without {TYPE_FIELD}: {value}"))),
        };
        let key = match object.get(KEY_FIELD) {
            None | Some(Value::Null) => FunctionalKey::default(),
            Some(raw) => parse_key(raw)?,
        };
        let fields = object
            .iter()
            .filter(|(name, _)| name.as_str() != TYPE_FIELD && name.as_str() != KEY_FIELD)
            .map(|(name, v)| (name.clone(), v.clone()))
            .collect();
        Ok(Self {
            entity_type,
            key,
            fields,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(TYPE_FIELD.to_string(), Value::String(self.entity_type.clone()));
        if !self.key.is_empty() {
            object.insert(KEY_FIELD.to_string(), self.key.to_value());
        }
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Record::from_value(&value).map_err(D::Error::custom)
    }
}

/// Ordered list of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    records: Vec<Record>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Top-level record with the given type and key.
    pub fn find(&self, entity_type: &str, key: &FunctionalKey) -> Option<&Record> {
        self.records
            .iter()
            .find(|r| r.entity_type == entity_type && &r.key == key)
    }

    pub fn from_json(text: &str) -> DocumentResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> DocumentResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| invalid("a document must be a JSON array of records"))?;
        let records = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                Record::from_value(item).map_err(|e| invalid(format!("record #{i}: {e}")))
            })
            .collect::<DocumentResult<Vec<_>>>()?;
        Ok(Self { records })
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.records.iter().map(Record::to_value).collect())
    }

    pub fn to_json(&self, pretty: bool) -> DocumentResult<String> {
        let value = self.to_value();
        let text = if pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(text)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::from_value(&value).map_err(D::Error::custom)
    }
}

/// Decoded value of a single-link field.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkPayload {
    /// `null`: the link is unset.
    Null,
    /// Full inline record.
    Nested(Record),
    /// Reference by key; `entity_type` is set for `[type, key]` tags.
    Ref {
        entity_type: Option<String>,
        key: FunctionalKey,
    },
}

impl LinkPayload {
    pub fn decode(value: &Value) -> DocumentResult<Self> {
        match value {
            Value::Null => Ok(LinkPayload::Null),
            Value::Object(_) => Ok(LinkPayload::Nested(Record::from_value(value)?)),
            Value::Array(items) => match items.as_slice() {
                [Value::String(t), key] => Ok(LinkPayload::Ref {
                    entity_type: Some(t.clone()),
                    key: parse_key(key)?,
                }),
                _ => Ok(LinkPayload::Ref {
                    entity_type: None,
                    key: parse_key(value)?,
                }),
            },
            other => Err(invalid(format!(
                "expected null, a record or a key, got {other}"
            ))),
        }
    }

    /// Wire form of a bare key reference.
    pub fn key(key: &FunctionalKey) -> Value {
        key.to_value()
    }

    /// Wire form of a type-tagged reference.
    pub fn tagged(entity_type: &str, key: &FunctionalKey) -> Value {
        Value::Array(vec![Value::String(entity_type.to_string()), key.to_value()])
    }
}

/// One step of a multi-link action list.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// `["write", [keys], {field: value}]`
    Write {
        keys: Vec<FunctionalKey>,
        values: BTreeMap<String, Value>,
    },
    /// `["create", [records]]`
    Create(Vec<Record>),
    /// `["delete", [keys]]`
    Delete(Vec<FunctionalKey>),
    /// `["add", [keys]]`
    Add(Vec<FunctionalKey>),
    /// `["remove", [keys]]`
    Remove(Vec<FunctionalKey>),
}

const ACTION_NAMES: [&str; 5] = ["write", "create", "delete", "add", "remove"];

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Write { .. } => "write",
            Action::Create(_) => "create",
            Action::Delete(_) => "delete",
            Action::Add(_) => "add",
            Action::Remove(_) => "remove",
        }
    }

    fn decode(value: &Value) -> DocumentResult<Self> {
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
        let keys = |raw: &Value| -> DocumentResult<Vec<FunctionalKey>> {
            raw.as_array()
                .ok_or_else(|| invalid(format!("expected a list of keys, got {raw}")))?
                .iter()
                .map(parse_key)
                .collect()
        };
        match items {
            [Value::String(name), list, Value::Object(values)] if name == "write" => {
                Ok(Action::Write {
                    keys: keys(list)?,
                    values: values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                })
            }
            [Value::String(name), list] => match name.as_str() {
                "create" => {
                    let records = list
                        .as_array()
                        .ok_or_else(|| invalid(format!("expected a list of records, got {list}")))?
                        .iter()
                        .map(Record::from_value)
                        .collect::<DocumentResult<Vec<_>>>()?;
                    Ok(Action::Create(records))
                }
                "delete" => Ok(Action::Delete(keys(list)?)),
                "add" => Ok(Action::Add(keys(list)?)),
                "remove" => Ok(Action::Remove(keys(list)?)),
                other => Err(invalid(format!("malformed {other:?} action: {value}"))),
            },
            _ => Err(invalid(format!("malformed action: {value}"))),
        }
    }

    pub fn to_value(&self) -> Value {
        let keys = |keys: &[FunctionalKey]| Value::Array(keys.iter().map(FunctionalKey::to_value).collect());
        let name = Value::String(self.name().to_string());
        match self {
            Action::Write { keys: k, values } => Value::Array(vec![
                name,
                keys(k),
                Value::Object(values.iter().map(|(f, v)| (f.clone(), v.clone())).collect()),
            ]),
            Action::Create(records) => Value::Array(vec![
                name,
                Value::Array(records.iter().map(Record::to_value).collect()),
            ]),
            Action::Delete(k) | Action::Add(k) | Action::Remove(k) => {
                Value::Array(vec![name, keys(k)])
            }
        }
    }
}

/// Decoded value of a multi-link field.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiPayload {
    /// Full member list; replaces the current members.
    Members(Vec<LinkPayload>),
    /// Partial update applied on top of the current members.
    Actions(Vec<Action>),
}

impl MultiPayload {
    pub fn decode(value: &Value) -> DocumentResult<Self> {
        let items = match value {
            Value::Null => return Ok(MultiPayload::Members(Vec::new())),
            Value::Array(items) => items,
            other => return Err(invalid(format!("expected a list, got {other}"))),
        };

        let is_action = |item: &Value| {
            matches!(
                item.as_array().and_then(|a| a.first()),
                Some(Value::String(name)) if ACTION_NAMES.contains(&name.as_str())
            )
        };
        if !items.is_empty() && items.iter().all(is_action) {
            return items
                .iter()
                .map(Action::decode)
                .collect::<DocumentResult<Vec<_>>>()
                .map(MultiPayload::Actions);
        }

        items
            .iter()
            .map(|item| match LinkPayload::decode(item)? {
                LinkPayload::Null => Err(invalid("null is not a valid list member")),
                payload => Ok(payload),
            })
            .collect::<DocumentResult<Vec<_>>>()
            .map(MultiPayload::Members)
    }

    /// Wire form of an action list.
    pub fn actions(actions: &[Action]) -> Value {
        Value::Array(actions.iter().map(Action::to_value).collect())
    }
}
