//! Functional keys: storage-independent record identity.
//!
//! A key is an ordered tuple of `(field_name, value)` pairs kept sorted by
//! field name, so two keys built from the same fields compare equal no
//! matter in which order the fields were declared or supplied. On the wire
//! a key is `[[field, value], ...]`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Part name carrying the owner's key in a synthetic composition key.
pub const OWNER_KEY_FIELD: &str = "__owner__";
/// Part name carrying the composition field name in a synthetic key.
pub const FIELD_KEY_FIELD: &str = "__field__";
/// Part name carrying the member position in a synthetic key.
pub const ORDINAL_KEY_FIELD: &str = "__ordinal__";

/// Business identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(String, Value)>")]
pub struct FunctionalKey(Vec<(String, Value)>);

impl FunctionalKey {
    /// Builds a key from `(field, value)` pairs. Pairs are sorted by field name.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self::from(
            parts
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect::<Vec<_>>(),
        )
    }

    /// Key for a composition member whose type declares no key fields:
    /// `(owner_key, field_name, ordinal)`.
    pub fn synthetic(owner: &FunctionalKey, field: &str, ordinal: usize) -> Self {
        Self::new([
            (OWNER_KEY_FIELD, owner.to_value()),
            (FIELD_KEY_FIELD, Value::String(field.to_string())),
            (ORDINAL_KEY_FIELD, Value::from(ordinal)),
        ])
    }

    /// Parses the wire form `[[field, value], ...]`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::InvalidKey(format!("expected an array, got {value}")))?;
        if items.is_empty() {
            return Err(Error::InvalidKey("key has no fields".into()));
        }

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            match item.as_array().map(Vec::as_slice) {
                Some([Value::String(name), v]) => parts.push((name.clone(), v.clone())),
                _ => {
                    return Err(Error::InvalidKey(format!(
                        "expected a [field, value] pair, got {item}"
                    )));
                }
            }
        }

        let key = Self::from(parts);
        if key.0.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(Error::InvalidKey(format!("duplicate field in key {key}")));
        }
        Ok(key)
    }

    /// Returns the wire form `[[field, value], ...]`.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|(name, value)| Value::Array(vec![Value::String(name.clone()), value.clone()]))
                .collect(),
        )
    }

    /// Returns the value of one key field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    /// Returns the sorted `(field, value)` pairs.
    pub fn parts(&self) -> &[(String, Value)] {
        &self.0
    }

    /// Number of key fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the key has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for keys built by [`FunctionalKey::synthetic`].
    pub fn is_synthetic(&self) -> bool {
        self.get(OWNER_KEY_FIELD).is_some() && self.get(ORDINAL_KEY_FIELD).is_some()
    }

    /// Filesystem-friendly rendering of the key's scalar values,
    /// e.g. `ACME-42` for `[["code","ACME"],["number",42]]`.
    pub fn slug(&self) -> String {
        let mut out = String::new();
        for (_, value) in &self.0 {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                other => FunctionalKey::from_value(other)
                    .map(|k| k.slug())
                    .unwrap_or_default(),
            };
            let cleaned: String = text
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            if cleaned.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('-');
            }
            out.push_str(&cleaned);
        }
        out
    }
}

impl From<Vec<(String, Value)>> for FunctionalKey {
    fn from(mut parts: Vec<(String, Value)>) -> Self {
        parts.sort_by(|a, b| a.0.cmp(&b.0));
        Self(parts)
    }
}

// Hashing and ordering go through the canonical JSON text; equal keys
// always render identically because object maps are sorted.
impl Hash for FunctionalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl PartialOrd for FunctionalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FunctionalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl fmt::Display for FunctionalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}
