//! Per-call bookkeeping of records already handled by an export or import.

use crate::error::{TransferError, TransferResult};
use graphport_model::{Entity, LinkRef};
use graphport_types::FunctionalKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Storage-independent address of a record: type plus functional key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub entity_type: String,
    pub key: FunctionalKey,
}

impl TargetRef {
    pub fn new(entity_type: impl Into<String>, key: FunctionalKey) -> Self {
        Self {
            entity_type: entity_type.into(),
            key,
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity_type, self.key)
    }
}

/// Keys fully emitted so far, per type.
#[derive(Debug, Default)]
pub struct ExportLedger {
    emitted: BTreeMap<String, BTreeSet<FunctionalKey>>,
}

impl ExportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key. Returns `false` when it was already emitted.
    pub fn register(&mut self, entity_type: &str, key: &FunctionalKey) -> bool {
        self.emitted
            .entry(entity_type.to_string())
            .or_default()
            .insert(key.clone())
    }

}

/// Records materialized by one import, per type and key.
///
/// Grows monotonically; a key registered twice is a
/// [`TransferError::DuplicateRecord`].
#[derive(Debug, Default, Clone)]
pub struct ImportLedger {
    records: BTreeMap<String, BTreeMap<FunctionalKey, Entity>>,
}

impl ImportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: &TargetRef, entity: Entity) -> TransferResult<()> {
        let by_key = self.records.entry(target.entity_type.clone()).or_default();
        if by_key.contains_key(&target.key) {
            return Err(TransferError::DuplicateRecord {
                entity_type: target.entity_type.clone(),
                key: target.key.clone(),
            });
        }
        by_key.insert(target.key.clone(), entity);
        Ok(())
    }

    pub fn get(&self, target: &TargetRef) -> Option<&Entity> {
        self.records
            .get(&target.entity_type)
            .and_then(|by_key| by_key.get(&target.key))
    }

    /// Storage pointer of a materialized record.
    pub fn link(&self, target: &TargetRef) -> Option<LinkRef> {
        self.get(target).map(Entity::link)
    }

    pub fn contains(&self, target: &TargetRef) -> bool {
        self.get(target).is_some()
    }

    /// Records of one type, ordered by key.
    pub fn records_of(&self, entity_type: &str) -> impl Iterator<Item = (&FunctionalKey, &Entity)> {
        self.records.get(entity_type).into_iter().flatten()
    }

    /// Every record, ordered by type then key.
    pub fn iter(&self) -> impl Iterator<Item = (TargetRef, &Entity)> {
        self.records.iter().flat_map(|(t, by_key)| {
            by_key
                .iter()
                .map(move |(key, entity)| (TargetRef::new(t.clone(), key.clone()), entity))
        })
    }

    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces every stored snapshot with the result of `reload`.
    pub(crate) fn refresh<F>(&mut self, mut reload: F) -> TransferResult<()>
    where
        F: FnMut(&Entity) -> TransferResult<Option<Entity>>,
    {
        for by_key in self.records.values_mut() {
            for entity in by_key.values_mut() {
                if let Some(current) = reload(entity)? {
                    *entity = current;
                }
            }
        }
        Ok(())
    }
}
