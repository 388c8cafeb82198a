//! Graph export/import engine for graphport.
//!
//! Records are identified across storage instances by their functional
//! key, never by storage ids:
//! - [`Exporter`] walks the graph reachable from a root record and emits a
//!   flat [`Document`], writing every record in full at most once.
//! - [`Importer`] materializes a document against a [`Repository`],
//!   deferring links whose targets appear later (or form cycles) and
//!   resolving them in relink passes.
//!
//! [`export_record`] and [`import_document`] are the operations transports
//! call; the import runs inside one [`TransactionScope`], so a failed
//! import leaves the repository untouched.

mod config;
mod document;
mod error;
mod export;
mod import;
mod ledger;

pub use config::{ExportConfig, ImportConfig};
pub use document::{
    Action, Document, DocumentError, DocumentResult, LinkPayload, MultiPayload, Record, KEY_FIELD,
    TYPE_FIELD,
};
pub use error::{ErrorKind, ErrorReport, PendingLink, TransferError, TransferResult};
pub use export::{export_filename, ExportOutput, ExportSummary, Exporter};
pub use import::{ImportOutcome, Importer, RelinkStats};
pub use ledger::{ExportLedger, ImportLedger, TargetRef};

use graphport_model::{Entity, SchemaRegistry};
use graphport_storage::{Repository, TransactionScope};
use tracing::warn;

/// Exports the graph rooted at `root`: suggested filename, document and
/// per-type summary.
pub fn export_record<R>(
    repo: &R,
    registry: &SchemaRegistry,
    root: &Entity,
    config: &ExportConfig,
) -> TransferResult<ExportOutput>
where
    R: Repository + ?Sized,
{
    Exporter::new(repo, registry, config).run(root)
}

/// Imports `document` in a single transaction. Any error rolls back every
/// write made by the call.
pub fn import_document<R>(
    repo: &mut R,
    registry: &SchemaRegistry,
    document: &Document,
    config: &ImportConfig,
) -> TransferResult<ImportOutcome>
where
    R: Repository + ?Sized,
{
    let mut scope = TransactionScope::begin(repo)?;
    let outcome = match Importer::new(&mut *scope, registry, config).import(document) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Import failed, rolling back");
            return Err(e);
        }
    };
    scope.commit()?;
    Ok(outcome)
}
