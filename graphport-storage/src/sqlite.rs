//! SQLite-backed repository.
//!
//! Records are stored as typed JSON blobs in a single table; functional
//! key lookups scan the records of one type and compare computed keys.

use crate::error::{StorageError, StorageResult};
use crate::repository::{filter_by_key, Repository};
use graphport_model::{
    Entity, EntityLoader, FieldMap, FieldValue, ImportHandler, LinkRef, ModelError, ModelResult,
    SchemaRegistry,
};
use graphport_types::{FunctionalKey, RecordId};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Repository persisted in a SQLite database.
pub struct SqliteRepository {
    conn: Connection,
    in_transaction: bool,
    handlers: HashMap<String, Arc<dyn ImportHandler>>,
}

impl SqliteRepository {
    /// Opens (or creates) a repository at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory repository (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let repo = Self {
            conn,
            in_transaction: false,
            handlers: HashMap::new(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    /// Registers a post-import handler for a type.
    pub fn with_handler(mut self, entity_type: &str, handler: Arc<dyn ImportHandler>) -> Self {
        self.handlers.insert(entity_type.to_string(), handler);
        self
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity_type TEXT NOT NULL,
                fields TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS records_by_type ON records (entity_type, seq);
            ",
        )?;
        Ok(())
    }

    /// All records of a type, in insertion order.
    pub fn all(&self, entity_type: &str) -> StorageResult<Vec<Entity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fields FROM records WHERE entity_type = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![entity_type], |row| {
            let id: String = row.get(0)?;
            let fields: String = row.get(1)?;
            Ok((id, fields))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, fields) = row?;
            result.push(decode_row(entity_type, &id, &fields)?);
        }
        Ok(result)
    }

    /// Number of records of a type.
    pub fn count(&self, entity_type: &str) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE entity_type = ?1",
            params![entity_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn exists(&self, link: &LinkRef) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM records WHERE id = ?1 AND entity_type = ?2",
                params![link.id.to_string(), link.entity_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn check_links(&self, fields: &FieldMap) -> StorageResult<()> {
        for (name, value) in fields {
            let links: &[LinkRef] = match value {
                FieldValue::Scalar(_) | FieldValue::Link(None) => &[],
                FieldValue::Link(Some(link)) => std::slice::from_ref(link),
                FieldValue::Links(links) => links,
            };
            for link in links {
                if !self.exists(link)? {
                    return Err(StorageError::InvalidData(format!(
                        "field {name} links to missing record {}/{}",
                        link.entity_type, link.id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn decode_row(entity_type: &str, id: &str, fields: &str) -> StorageResult<Entity> {
    let id = RecordId::parse(id)
        .map_err(|e| StorageError::InvalidData(format!("invalid record id {id}: {e}")))?;
    let fields: FieldMap = serde_json::from_str(fields)?;
    Ok(Entity::new(id, entity_type, fields))
}

impl EntityLoader for SqliteRepository {
    fn load(&self, link: &LinkRef) -> ModelResult<Option<Entity>> {
        self.get(link).map_err(|e| ModelError::Lookup(e.to_string()))
    }
}

impl Repository for SqliteRepository {
    fn find_by_key(
        &self,
        registry: &SchemaRegistry,
        entity_type: &str,
        key: &FunctionalKey,
    ) -> StorageResult<Vec<Entity>> {
        filter_by_key(registry, self, self.all(entity_type)?, key)
    }

    fn get(&self, link: &LinkRef) -> StorageResult<Option<Entity>> {
        let fields: Option<String> = self
            .conn
            .query_row(
                "SELECT fields FROM records WHERE id = ?1 AND entity_type = ?2",
                params![link.id.to_string(), link.entity_type],
                |row| row.get(0),
            )
            .optional()?;
        match fields {
            Some(fields) => Ok(Some(decode_row(&link.entity_type, &link.id.to_string(), &fields)?)),
            None => Ok(None),
        }
    }

    fn create(&mut self, entity_type: &str, fields: FieldMap) -> StorageResult<Entity> {
        self.check_links(&fields)?;
        let entity = Entity::new(RecordId::new(), entity_type, fields);
        self.conn.execute(
            "INSERT INTO records (id, entity_type, fields) VALUES (?1, ?2, ?3)",
            params![
                entity.id.to_string(),
                entity.entity_type,
                serde_json::to_string(&entity.fields)?,
            ],
        )?;
        Ok(entity)
    }

    fn update(&mut self, entity: &Entity, fields: FieldMap) -> StorageResult<Entity> {
        self.check_links(&fields)?;
        let mut stored = self
            .get(&entity.link())?
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", entity.entity_type, entity.id)))?;
        stored.apply(fields);
        self.conn.execute(
            "UPDATE records SET fields = ?1 WHERE id = ?2",
            params![serde_json::to_string(&stored.fields)?, stored.id.to_string()],
        )?;
        Ok(stored)
    }

    fn delete(&mut self, links: &[LinkRef]) -> StorageResult<()> {
        let mut stmt = self
            .conn
            .prepare("DELETE FROM records WHERE id = ?1 AND entity_type = ?2")?;
        for link in links {
            stmt.execute(params![link.id.to_string(), link.entity_type])?;
        }
        Ok(())
    }

    fn handler(&self, entity_type: &str) -> Option<Arc<dyn ImportHandler>> {
        self.handlers.get(entity_type).cloned()
    }

    fn begin(&mut self) -> StorageResult<()> {
        if self.in_transaction {
            return Err(StorageError::Transaction("transaction already active".into()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        debug!("SQLite transaction started");
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        if !self.in_transaction {
            return Err(StorageError::Transaction("no active transaction".into()));
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if !self.in_transaction {
            return Err(StorageError::Transaction("no active transaction".into()));
        }
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
