//! The repository boundary the exporter and importer talk to.

use crate::error::{StorageError, StorageResult};
use graphport_model::{
    compute_key, Entity, EntityLoader, FieldMap, ImportHandler, LinkRef, ModelError,
    SchemaRegistry,
};
use graphport_types::FunctionalKey;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage collaborator consumed by the transfer engine.
///
/// Every call is synchronous. Callers wrap whole operations in a
/// [`TransactionScope`]; implementations only need to honour
/// `begin`/`commit`/`rollback`.
pub trait Repository: EntityLoader {
    /// Records of `entity_type` whose functional key equals `key`.
    /// More than one match means the key is ambiguous in this store.
    fn find_by_key(
        &self,
        registry: &SchemaRegistry,
        entity_type: &str,
        key: &FunctionalKey,
    ) -> StorageResult<Vec<Entity>>;

    /// Loads one record.
    fn get(&self, link: &LinkRef) -> StorageResult<Option<Entity>>;

    /// Persists a new record and assigns its storage id.
    fn create(&mut self, entity_type: &str, fields: FieldMap) -> StorageResult<Entity>;

    /// Writes `fields` over an existing record and returns the stored result.
    fn update(&mut self, entity: &Entity, fields: FieldMap) -> StorageResult<Entity>;

    /// Deletes records. Unknown ids are ignored.
    fn delete(&mut self, links: &[LinkRef]) -> StorageResult<()>;

    /// Handler registered for a type, if any.
    fn handler(&self, entity_type: &str) -> Option<Arc<dyn ImportHandler>> {
        let _ = entity_type;
        None
    }

    /// Hook run once per type after an import materialized `records`:
    /// validation, then derived-field recompute.
    fn post_import(&mut self, entity_type: &str, records: &[Entity]) -> StorageResult<()> {
        let Some(handler) = self.handler(entity_type) else {
            return Ok(());
        };
        for record in records {
            handler
                .validate(record)
                .map_err(|message| StorageError::Validation {
                    entity_type: entity_type.to_string(),
                    id: record.id.to_string(),
                    message,
                })?;
            if let Some(derived) = handler.recompute(record) {
                debug!(entity_type = %entity_type, id = %record.id, "Recomputing derived fields");
                self.update(record, derived)?;
            }
        }
        Ok(())
    }

    /// Starts a transaction.
    fn begin(&mut self) -> StorageResult<()>;

    /// Makes the current transaction's writes durable.
    fn commit(&mut self) -> StorageResult<()>;

    /// Discards the current transaction's writes.
    fn rollback(&mut self) -> StorageResult<()>;
}

/// Keeps the candidates whose computed key equals `key`.
///
/// Candidates whose key cannot be computed (unset or dangling key link)
/// cannot match and are skipped.
pub fn filter_by_key<L>(
    registry: &SchemaRegistry,
    loader: &L,
    candidates: impl IntoIterator<Item = Entity>,
    key: &FunctionalKey,
) -> StorageResult<Vec<Entity>>
where
    L: EntityLoader + ?Sized,
{
    let mut matches = Vec::new();
    for candidate in candidates {
        match compute_key(registry, loader, &candidate) {
            Ok(candidate_key) if &candidate_key == key => matches.push(candidate),
            Ok(_) => {}
            Err(ModelError::UnsetKeyLink { .. } | ModelError::DanglingLink { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(matches)
}

/// Transaction guard: rolls back on drop unless committed.
pub struct TransactionScope<'a, R: Repository + ?Sized> {
    repo: &'a mut R,
    finished: bool,
}

impl<'a, R: Repository + ?Sized> TransactionScope<'a, R> {
    /// Begins a transaction on `repo`.
    pub fn begin(repo: &'a mut R) -> StorageResult<Self> {
        repo.begin()?;
        Ok(Self {
            repo,
            finished: false,
        })
    }

    /// Commits. On failure the guard still rolls back when dropped.
    pub fn commit(mut self) -> StorageResult<()> {
        self.repo.commit()?;
        self.finished = true;
        Ok(())
    }

    /// Rolls back explicitly.
    pub fn rollback(mut self) -> StorageResult<()> {
        self.finished = true;
        self.repo.rollback()
    }
}

impl<R: Repository + ?Sized> Deref for TransactionScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.repo
    }
}

impl<R: Repository + ?Sized> DerefMut for TransactionScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.repo
    }
}

impl<R: Repository + ?Sized> Drop for TransactionScope<'_, R> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Transaction scope dropped without commit, rolling back");
            if let Err(e) = self.repo.rollback() {
                warn!(error = %e, "Rollback failed");
            }
        }
    }
}
