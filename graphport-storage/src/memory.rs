//! In-memory repository.
//!
//! Keeps records in insertion order. Transactions snapshot the whole store
//! on `begin` and restore it on `rollback`.

use crate::error::{StorageError, StorageResult};
use crate::repository::{filter_by_key, Repository};
use graphport_model::{
    Entity, EntityLoader, FieldMap, FieldValue, ImportHandler, LinkRef, ModelError, ModelResult,
    SchemaRegistry,
};
use graphport_types::{FunctionalKey, RecordId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Tables {
    records: HashMap<RecordId, Entity>,
    order: Vec<RecordId>,
}

/// Repository holding everything in process memory.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Tables,
    snapshot: Option<Tables>,
    handlers: HashMap<String, Arc<dyn ImportHandler>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a post-import handler for a type.
    pub fn with_handler(mut self, entity_type: &str, handler: Arc<dyn ImportHandler>) -> Self {
        self.handlers.insert(entity_type.to_string(), handler);
        self
    }

    /// All records of a type, in insertion order.
    pub fn all(&self, entity_type: &str) -> Vec<Entity> {
        self.tables
            .order
            .iter()
            .filter_map(|id| self.tables.records.get(id))
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect()
    }

    /// Number of records of a type.
    pub fn count(&self, entity_type: &str) -> usize {
        self.tables
            .records
            .values()
            .filter(|e| e.entity_type == entity_type)
            .count()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.tables.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.records.is_empty()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn check_links(&self, fields: &FieldMap) -> StorageResult<()> {
        for (name, value) in fields {
            let links: &[LinkRef] = match value {
                FieldValue::Scalar(_) | FieldValue::Link(None) => &[],
                FieldValue::Link(Some(link)) => std::slice::from_ref(link),
                FieldValue::Links(links) => links,
            };
            for link in links {
                match self.tables.records.get(&link.id) {
                    Some(target) if target.entity_type == link.entity_type => {}
                    _ => {
                        return Err(StorageError::InvalidData(format!(
                            "field {name} links to missing record {}/{}",
                            link.entity_type, link.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl EntityLoader for MemoryRepository {
    fn load(&self, link: &LinkRef) -> ModelResult<Option<Entity>> {
        self.get(link).map_err(|e| ModelError::Lookup(e.to_string()))
    }
}

impl Repository for MemoryRepository {
    fn find_by_key(
        &self,
        registry: &SchemaRegistry,
        entity_type: &str,
        key: &FunctionalKey,
    ) -> StorageResult<Vec<Entity>> {
        filter_by_key(registry, self, self.all(entity_type), key)
    }

    fn get(&self, link: &LinkRef) -> StorageResult<Option<Entity>> {
        Ok(self
            .tables
            .records
            .get(&link.id)
            .filter(|e| e.entity_type == link.entity_type)
            .cloned())
    }

    fn create(&mut self, entity_type: &str, fields: FieldMap) -> StorageResult<Entity> {
        self.check_links(&fields)?;
        let entity = Entity::new(RecordId::new(), entity_type, fields);
        self.tables.order.push(entity.id);
        self.tables.records.insert(entity.id, entity.clone());
        Ok(entity)
    }

    fn update(&mut self, entity: &Entity, fields: FieldMap) -> StorageResult<Entity> {
        self.check_links(&fields)?;
        let stored = self
            .tables
            .records
            .get_mut(&entity.id)
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", entity.entity_type, entity.id)))?;
        stored.apply(fields);
        Ok(stored.clone())
    }

    fn delete(&mut self, links: &[LinkRef]) -> StorageResult<()> {
        for link in links {
            self.tables.records.remove(&link.id);
        }
        let records = &self.tables.records;
        self.tables.order.retain(|id| records.contains_key(id));
        Ok(())
    }

    fn handler(&self, entity_type: &str) -> Option<Arc<dyn ImportHandler>> {
        self.handlers.get(entity_type).cloned()
    }

    fn begin(&mut self) -> StorageResult<()> {
        if self.snapshot.is_some() {
            return Err(StorageError::Transaction("transaction already active".into()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::Transaction("no active transaction".into()))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StorageError::Transaction("no active transaction".into()))?;
        self.tables = snapshot;
        Ok(())
    }
}
