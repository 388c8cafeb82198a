//! Repository boundary for graphport.
//!
//! The transfer engine only ever talks to the [`Repository`] trait:
//! key lookup, create/update/delete, a post-import hook and a transaction
//! scope. Two implementations ship with the crate:
//!
//! - [`MemoryRepository`]: process-local, snapshot-based transactions
//! - [`SqliteRepository`]: records as JSON blobs in SQLite, real transactions
//!
//! Whole operations run inside a [`TransactionScope`], which rolls back
//! when dropped without an explicit commit.

mod error;
mod memory;
mod repository;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryRepository;
pub use repository::{filter_by_key, Repository, TransactionScope};
pub use sqlite::SqliteRepository;
