//! Exporter: walks a record graph and emits a flat document.
//!
//! Records are appended post-order, so a link target lands in the document
//! before the record that first references it. A (type, key) is written in
//! full at most once per export; later occurrences are bare keys.
//! Composition members are nested inline in their owner.

use crate::config::ExportConfig;
use crate::document::{Document, LinkPayload, Record};
use crate::error::{TransferError, TransferResult};
use crate::ledger::ExportLedger;
use graphport_model::{
    compute_key, is_exportable, Entity, FieldDef, FieldKind, LinkRef, ModelError, SchemaRegistry,
};
use graphport_storage::Repository;
use graphport_types::FunctionalKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Per-type counts of the records written in full by one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub root_type: String,
    pub root_key: FunctionalKey,
    /// Full records per type, composition members included.
    pub records: BTreeMap<String, usize>,
}

impl ExportSummary {
    pub fn total(&self) -> usize {
        self.records.values().sum()
    }

    pub fn count(&self, entity_type: &str) -> usize {
        self.records.get(entity_type).copied().unwrap_or(0)
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total();
        write!(
            f,
            "Exported {} {}: {} record{}",
            self.root_type,
            self.root_key,
            total,
            if total == 1 { "" } else { "s" }
        )?;
        for (entity_type, count) in &self.records {
            write!(f, "\n  {entity_type}: {count}")?;
        }
        Ok(())
    }
}

/// Everything a transport needs to hand an export to the user.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Suggested filename, e.g. `package-P1.json`.
    pub filename: String,
    pub document: Document,
    pub summary: ExportSummary,
    pretty: bool,
}

impl ExportOutput {
    /// Renders the document with the configured formatting.
    pub fn to_json(&self) -> TransferResult<String> {
        Ok(self.document.to_json(self.pretty)?)
    }
}

/// Filename for an export rooted at `entity_type`/`key`.
pub fn export_filename(entity_type: &str, key: &FunctionalKey, extension: &str) -> String {
    let slug = key.slug();
    if slug.is_empty() {
        format!("{entity_type}.{extension}")
    } else {
        format!("{entity_type}-{slug}.{extension}")
    }
}

/// One export call. Owns its ledger.
pub struct Exporter<'a, R: Repository + ?Sized> {
    repo: &'a R,
    registry: &'a SchemaRegistry,
    config: &'a ExportConfig,
    ledger: ExportLedger,
    records: Vec<Record>,
    counts: BTreeMap<String, usize>,
}

impl<'a, R: Repository + ?Sized> Exporter<'a, R> {
    pub fn new(repo: &'a R, registry: &'a SchemaRegistry, config: &'a ExportConfig) -> Self {
        Self {
            repo,
            registry,
            config,
            ledger: ExportLedger::new(),
            records: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    /// Exports the graph reachable from `root`.
    pub fn export(self, root: &Entity) -> TransferResult<Document> {
        self.run(root).map(|output| output.document)
    }

    /// Exports and names the result.
    pub fn run(mut self, root: &Entity) -> TransferResult<ExportOutput> {
        info!(entity_type = %root.entity_type, id = %root.id, "Starting export");
        let root_key = self.visit(root, 0)?;
        let summary = ExportSummary {
            root_type: root.entity_type.clone(),
            root_key,
            records: self.counts,
        };
        info!(
            entity_type = %summary.root_type,
            key = %summary.root_key,
            records = summary.total(),
            "Export finished"
        );
        Ok(ExportOutput {
            filename: export_filename(
                &summary.root_type,
                &summary.root_key,
                &self.config.file_extension,
            ),
            document: Document::from_records(self.records),
            summary,
            pretty: self.config.pretty,
        })
    }

    /// Emits `entity` unless already emitted; returns its key either way.
    fn visit(&mut self, entity: &Entity, depth: usize) -> TransferResult<FunctionalKey> {
        let key = compute_key(self.registry, self.repo, entity)?;
        if !self.ledger.register(&entity.entity_type, &key) {
            debug!(entity_type = %entity.entity_type, key = %key, "Already emitted, referencing by key");
            return Ok(key);
        }
        let record = self.build(entity, &key, depth)?;
        self.records.push(record);
        Ok(key)
    }

    fn build(&mut self, entity: &Entity, key: &FunctionalKey, depth: usize) -> TransferResult<Record> {
        if depth > self.config.max_depth {
            return Err(TransferError::DepthExceeded {
                entity_type: entity.entity_type.clone(),
                limit: self.config.max_depth,
            });
        }
        let registry = self.registry;
        let schema = registry.schema(&entity.entity_type)?;
        let mut record = Record::new(entity.entity_type.clone(), key.clone());

        for def in &schema.fields {
            if !is_exportable(registry, &entity.entity_type, &def.name)? {
                continue;
            }
            let value = match &def.kind {
                FieldKind::Scalar => match entity.get_scalar(&def.name) {
                    Some(v) => v.clone(),
                    None => continue,
                },
                FieldKind::SingleLink { target } => match entity.get_link(&def.name) {
                    Some(link) => self.reference(entity, def, target.is_polymorphic(), link, depth)?,
                    None => Value::Null,
                },
                FieldKind::Association { .. } => {
                    let mut refs = Vec::new();
                    for link in entity.get_links(&def.name) {
                        refs.push(self.reference(entity, def, false, link, depth)?);
                    }
                    Value::Array(refs)
                }
                FieldKind::Composition { .. } => {
                    let mut members = Vec::new();
                    for (ordinal, link) in entity.get_links(&def.name).iter().enumerate() {
                        let member = self.load(link)?;
                        if !registry.capabilities(&member.entity_type)?.keyed {
                            let member_key = FunctionalKey::synthetic(key, &def.name, ordinal);
                            members.push(self.build(&member, &member_key, depth + 1)?.to_value());
                            continue;
                        }
                        // Keyed members share the ledger with link targets.
                        let member_key = compute_key(registry, self.repo, &member)?;
                        if self.ledger.register(&member.entity_type, &member_key) {
                            members.push(self.build(&member, &member_key, depth + 1)?.to_value());
                        } else {
                            debug!(entity_type = %member.entity_type, key = %member_key, "Member already emitted, nesting key only");
                            members.push(Record::new(member.entity_type.clone(), member_key).to_value());
                        }
                    }
                    Value::Array(members)
                }
            };
            record.fields.insert(def.name.clone(), value);
        }

        *self.counts.entry(entity.entity_type.clone()).or_default() += 1;
        Ok(record)
    }

    /// Key reference to a link target, emitting the target first unless
    /// the field is light.
    fn reference(
        &mut self,
        owner: &Entity,
        def: &FieldDef,
        polymorphic: bool,
        link: &LinkRef,
        depth: usize,
    ) -> TransferResult<Value> {
        let target = self.load(link)?;
        if polymorphic && !self.registry.capabilities(&target.entity_type)?.exportable {
            return Err(TransferError::NotExportable {
                entity_type: owner.entity_type.clone(),
                field: def.name.clone(),
                target: target.entity_type,
            });
        }
        let key = if def.light {
            compute_key(self.registry, self.repo, &target)?
        } else {
            self.visit(&target, depth + 1)?
        };
        Ok(if polymorphic {
            LinkPayload::tagged(&target.entity_type, &key)
        } else {
            LinkPayload::key(&key)
        })
    }

    fn load(&self, link: &LinkRef) -> TransferResult<Entity> {
        self.repo.get(link)?.ok_or_else(|| {
            ModelError::DanglingLink {
                entity_type: link.entity_type.clone(),
                id: link.id.to_string(),
            }
            .into()
        })
    }
}
