//! Importer: materializes a document against a repository.
//!
//! - Phase A walks the records in document order, resolving or creating
//!   each one and linking what it can. Links whose target is not known yet
//!   are deferred; a record whose required links are deferred stays
//!   transient.
//! - Phase B ([`relink`]) retries deferred links until the queue drains
//!   or stops making progress.
//! - Phase C runs the repository's post-import hook per touched type.
//!
//! The importer does not open a transaction itself; see
//! [`import_document`](crate::import_document).

mod relink;
mod unit;

use crate::document::{Action, Document, LinkPayload, MultiPayload, Record, KEY_FIELD};
use crate::error::{TransferError, TransferResult};
use crate::ledger::{ImportLedger, TargetRef};
use crate::ImportConfig;
use graphport_model::{
    compute_key, CompositionPolicy, Entity, FieldKind, FieldMap, FieldValue, LinkRef, LinkTarget,
    RecordId, SchemaRegistry,
};
use graphport_storage::Repository;
use graphport_types::FunctionalKey;
use relink::{RelinkEntry, RelinkQueue};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};
use unit::{Deferred, LinkSlot, Member, PendingNode};

/// Relink bookkeeping of one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelinkStats {
    /// Queue entries created (blocked units and partially linked records).
    pub queued: usize,
    /// Relink passes run.
    pub passes: usize,
    /// Deferred links resolved during relinking.
    pub resolved: usize,
}

/// Result of a successful import.
#[derive(Debug)]
pub struct ImportOutcome {
    /// Every top-level record of the document, by type and key.
    pub ledger: ImportLedger,
    /// Records created, per type, in creation order.
    pub created: BTreeMap<String, Vec<Entity>>,
    /// Pre-existing records written to, per type.
    pub updated: BTreeMap<String, Vec<Entity>>,
    pub deleted: Vec<LinkRef>,
    pub stats: RelinkStats,
}

impl ImportOutcome {
    /// Materialized record for a document key.
    pub fn get(&self, entity_type: &str, key: &FunctionalKey) -> Option<&Entity> {
        self.ledger.get(&TargetRef::new(entity_type, key.clone()))
    }

    pub fn created_count(&self) -> usize {
        self.created.values().map(Vec::len).sum()
    }

    pub fn updated_count(&self) -> usize {
        self.updated.values().map(Vec::len).sum()
    }
}

/// One import call. Owns its ledger and relink queue.
pub struct Importer<'a, R: Repository + ?Sized> {
    repo: &'a mut R,
    registry: &'a SchemaRegistry,
    config: &'a ImportConfig,
    ledger: ImportLedger,
    queue: RelinkQueue,
    /// Queue entries added since the last relink pass.
    fresh: Vec<usize>,
    /// Targets entered into the ledger since the last relink pass.
    registered: Vec<TargetRef>,
    seen: HashSet<TargetRef>,
    created: Vec<LinkRef>,
    updated: Vec<LinkRef>,
    touched: HashSet<RecordId>,
    deleted: Vec<LinkRef>,
    stats: RelinkStats,
}

impl<'a, R: Repository + ?Sized> Importer<'a, R> {
    pub fn new(repo: &'a mut R, registry: &'a SchemaRegistry, config: &'a ImportConfig) -> Self {
        Self {
            repo,
            registry,
            config,
            ledger: ImportLedger::new(),
            queue: RelinkQueue::default(),
            fresh: Vec::new(),
            registered: Vec::new(),
            seen: HashSet::new(),
            created: Vec::new(),
            updated: Vec::new(),
            touched: HashSet::new(),
            deleted: Vec::new(),
            stats: RelinkStats::default(),
        }
    }

    /// Imports `document`.
    pub fn import(mut self, document: &Document) -> TransferResult<ImportOutcome> {
        info!(records = document.len(), "Starting import");
        for record in document.records() {
            self.materialize(record)?;
        }
        debug!(queued = self.queue.len(), "Materialization finished");

        self.relink()?;
        self.stats.queued = self.queue.queued();
        self.complete()
    }

    // ── Phase A ──────────────────────────────────────────────────────

    /// Resolves or creates a top-level (or link-nested) record and
    /// persists it unless it is blocked.
    fn materialize(&mut self, record: &Record) -> TransferResult<TargetRef> {
        let registry = self.registry;
        if !registry.contains(&record.entity_type) {
            return Err(TransferError::UnknownType(record.entity_type.clone()));
        }
        registry.key_fields(&record.entity_type)?;
        if record.key.is_empty() {
            return Err(TransferError::invalid(format!(
                "{} record has no {KEY_FIELD}",
                record.entity_type
            )));
        }

        let target = TargetRef::new(record.entity_type.clone(), record.key.clone());
        if !self.seen.insert(target.clone()) {
            return Err(TransferError::DuplicateRecord {
                entity_type: target.entity_type,
                key: target.key,
            });
        }

        let existing = self.find_unique(&target)?;
        debug!(
            entity_type = %target.entity_type,
            key = %target.key,
            existing = existing.is_some(),
            "Materializing record"
        );
        let node = self.build_node(record, target.clone(), existing)?;

        if node.blocked() {
            debug!(entity_type = %target.entity_type, key = %target.key, "Blocked on required links, deferring");
            let id = self.queue.push(RelinkEntry::Transient(node));
            self.fresh.push(id);
        } else {
            let entity = self.persist(node)?;
            self.ledger.insert(&target, entity)?;
        }
        Ok(target)
    }

    fn find_unique(&self, target: &TargetRef) -> TransferResult<Option<Entity>> {
        let mut found = self
            .repo
            .find_by_key(self.registry, &target.entity_type, &target.key)?;
        match found.len() {
            0 | 1 => Ok(found.pop()),
            matches => Err(TransferError::AmbiguousKey {
                entity_type: target.entity_type.clone(),
                key: target.key.clone(),
                matches,
            }),
        }
    }

    /// Ledger first, then the repository.
    fn resolve(&self, target: &TargetRef) -> TransferResult<Option<LinkRef>> {
        if let Some(link) = self.ledger.link(target) {
            return Ok(Some(link));
        }
        Ok(self.find_unique(target)?.map(|e| e.link()))
    }

    fn build_node(
        &mut self,
        record: &Record,
        target: TargetRef,
        existing: Option<Entity>,
    ) -> TransferResult<PendingNode> {
        let registry = self.registry;
        let schema = registry.schema(&record.entity_type)?;
        let mut node = PendingNode::new(target, existing);

        for (name, value) in &record.fields {
            let Some(def) = schema.field_def(name) else {
                if self.config.strict_fields {
                    return Err(TransferError::UnknownField {
                        entity_type: record.entity_type.clone(),
                        field: name.clone(),
                    });
                }
                warn!(entity_type = %record.entity_type, field = %name, "Skipping undeclared field");
                continue;
            };
            match &def.kind {
                FieldKind::Scalar => {
                    node.values.insert(name.clone(), FieldValue::Scalar(value.clone()));
                }
                FieldKind::SingleLink { target } => {
                    self.import_single(&mut node, name, target, value)?;
                }
                FieldKind::Association { target } => {
                    self.import_association(&mut node, name, target, value)?;
                }
                FieldKind::Composition { target } => {
                    self.import_composition(&mut node, name, target, value)?;
                }
            }
        }

        // Conditional requirements see the record's final scalars.
        let required: Vec<bool> = node
            .deferred
            .iter()
            .map(|d| {
                let single = node.links.get(&d.field).is_some_and(LinkSlot::is_single);
                single
                    && schema
                        .field_def(&d.field)
                        .is_some_and(|def| def.requirement.is_required(|f| node.scalar(f)))
            })
            .collect();
        for (d, required) in node.deferred.iter_mut().zip(required) {
            d.required = required;
        }
        Ok(node)
    }

    /// Maps a link payload to the record it designates. Nested records are
    /// materialized first.
    fn link_target(
        &mut self,
        owner: &TargetRef,
        field: &str,
        accepts: &LinkTarget,
        payload: LinkPayload,
    ) -> TransferResult<TargetRef> {
        let target = match payload {
            LinkPayload::Null => {
                return Err(TransferError::invalid(format!(
                    "{}.{field}: null is not a link target",
                    owner.entity_type
                )));
            }
            LinkPayload::Nested(record) => {
                if !accepts.accepts(&record.entity_type) {
                    return Err(TransferError::invalid(format!(
                        "{}.{field} cannot link to {}",
                        owner.entity_type, record.entity_type
                    )));
                }
                return self.materialize(&record);
            }
            LinkPayload::Ref {
                entity_type: Some(t),
                key,
            } => TargetRef::new(t, key),
            LinkPayload::Ref {
                entity_type: None,
                key,
            } => match accepts {
                LinkTarget::Type(t) => TargetRef::new(t.clone(), key),
                LinkTarget::Polymorphic(_) => {
                    return Err(TransferError::invalid(format!(
                        "{}.{field} needs a [type, key] reference",
                        owner.entity_type
                    )));
                }
            },
        };
        if !accepts.accepts(&target.entity_type) {
            return Err(TransferError::invalid(format!(
                "{}.{field} cannot link to {}",
                owner.entity_type, target.entity_type
            )));
        }
        Ok(target)
    }

    fn import_single(
        &mut self,
        node: &mut PendingNode,
        field: &str,
        accepts: &LinkTarget,
        value: &Value,
    ) -> TransferResult<()> {
        let payload = LinkPayload::decode(value)?;
        if payload == LinkPayload::Null {
            node.links.insert(field.to_string(), LinkSlot::Single(None));
            return Ok(());
        }
        let target = self.link_target(&node.target, field, accepts, payload)?;
        let slot = match self.resolve(&target)? {
            Some(link) => Some(link),
            None => {
                debug!(owner = %node.target, field, target = %target, "Deferring link");
                node.deferred.push(Deferred::new(field, 0, target));
                None
            }
        };
        node.links.insert(field.to_string(), LinkSlot::Single(slot));
        Ok(())
    }

    fn push_member(
        &self,
        node: &mut PendingNode,
        field: &str,
        slots: &mut Vec<Option<LinkRef>>,
        target: TargetRef,
    ) -> TransferResult<()> {
        match self.resolve(&target)? {
            Some(link) => slots.push(Some(link)),
            None => {
                debug!(owner = %node.target, field, target = %target, "Deferring association member");
                node.deferred.push(Deferred::new(field, slots.len(), target));
                slots.push(None);
            }
        }
        Ok(())
    }

    fn import_association(
        &mut self,
        node: &mut PendingNode,
        field: &str,
        target_type: &str,
        value: &Value,
    ) -> TransferResult<()> {
        let accepts = LinkTarget::Type(target_type.to_string());
        let slots = match MultiPayload::decode(value)? {
            MultiPayload::Members(members) => {
                let mut slots = Vec::with_capacity(members.len());
                for payload in members {
                    let target = self.link_target(&node.target, field, &accepts, payload)?;
                    self.push_member(node, field, &mut slots, target)?;
                }
                slots
            }
            MultiPayload::Actions(actions) => {
                let mut slots: Vec<Option<LinkRef>> = node
                    .existing
                    .as_ref()
                    .map(|e| e.get_links(field).iter().cloned().map(Some).collect())
                    .unwrap_or_default();
                for action in actions {
                    self.apply_association_action(node, field, target_type, &mut slots, action)?;
                }
                slots
            }
        };
        node.links.insert(field.to_string(), LinkSlot::Many(slots));
        Ok(())
    }

    fn apply_association_action(
        &mut self,
        node: &mut PendingNode,
        field: &str,
        target_type: &str,
        slots: &mut Vec<Option<LinkRef>>,
        action: Action,
    ) -> TransferResult<()> {
        match action {
            Action::Add(keys) => {
                for key in keys {
                    self.push_member(node, field, slots, TargetRef::new(target_type, key))?;
                }
            }
            Action::Create(records) => {
                let accepts = LinkTarget::Type(target_type.to_string());
                for record in records {
                    let target = self.link_target(
                        &node.target,
                        field,
                        &accepts,
                        LinkPayload::Nested(record),
                    )?;
                    self.push_member(node, field, slots, target)?;
                }
            }
            Action::Remove(keys) => {
                for key in keys {
                    self.unlink(node, field, slots, &TargetRef::new(target_type, key))?;
                }
            }
            Action::Delete(keys) => {
                for key in keys {
                    let target = TargetRef::new(target_type, key);
                    if let Some(link) = self.unlink(node, field, slots, &target)? {
                        node.deletes.push(link);
                    }
                }
            }
            Action::Write { keys, values } => {
                for key in keys {
                    let target = TargetRef::new(target_type, key);
                    let link = self.resolve(&target)?.ok_or_else(|| {
                        TransferError::invalid(format!("cannot write {target}: no such record"))
                    })?;
                    self.write_scalars(&link, &values)?;
                }
            }
        }
        Ok(())
    }

    /// Drops `target` from an association. Unknown targets are ignored.
    fn unlink(
        &self,
        node: &mut PendingNode,
        field: &str,
        slots: &mut [Option<LinkRef>],
        target: &TargetRef,
    ) -> TransferResult<Option<LinkRef>> {
        node.deferred
            .retain(|d| !(d.field == field && &d.target == target));
        let Some(link) = self.resolve(target)? else {
            return Ok(None);
        };
        for slot in slots.iter_mut() {
            if slot.as_ref() == Some(&link) {
                *slot = None;
            }
        }
        Ok(Some(link))
    }

    /// Writes scalar fields onto an existing record right away.
    fn write_scalars(&mut self, link: &LinkRef, values: &BTreeMap<String, Value>) -> TransferResult<()> {
        let fields = self.scalar_fields(&link.entity_type, values)?;
        let current = self.repo.get(link)?.ok_or_else(|| {
            TransferError::invalid(format!("cannot write {}/{}: no such record", link.entity_type, link.id))
        })?;
        let updated = self.repo.update(&current, fields)?;
        self.track_updated(&updated);
        Ok(())
    }

    /// Checks that every field of a `write` action is a declared scalar.
    fn scalar_fields(&self, entity_type: &str, values: &BTreeMap<String, Value>) -> TransferResult<FieldMap> {
        let mut fields = FieldMap::new();
        for (name, value) in values {
            let def = self.registry.field(entity_type, name)?;
            if def.kind != FieldKind::Scalar {
                return Err(TransferError::invalid(format!(
                    "write actions only set scalar fields, {entity_type}.{name} is a link"
                )));
            }
            fields.insert(name.clone(), FieldValue::Scalar(value.clone()));
        }
        Ok(fields)
    }

    // ── Compositions ─────────────────────────────────────────────────

    fn import_composition(
        &mut self,
        node: &mut PendingNode,
        field: &str,
        member_type: &str,
        value: &Value,
    ) -> TransferResult<()> {
        let registry = self.registry;
        let policy = registry.capabilities(member_type)?.composition_policy;

        // Current members with the key they are matched by.
        let mut current: Vec<(FunctionalKey, Entity)> = Vec::new();
        if let Some(existing) = &node.existing {
            for (ordinal, link) in existing.get_links(field).iter().enumerate() {
                let Some(child) = self.repo.get(link)? else {
                    continue;
                };
                let key = match policy {
                    CompositionPolicy::ForceRecreate => {
                        FunctionalKey::synthetic(&node.target.key, field, ordinal)
                    }
                    CompositionPolicy::ReconcileByKey => compute_key(registry, &*self.repo, &child)?,
                };
                current.push((key, child));
            }
        }

        let members = match MultiPayload::decode(value)? {
            MultiPayload::Members(payloads) => {
                let mut records = Vec::with_capacity(payloads.len());
                for payload in payloads {
                    match payload {
                        LinkPayload::Nested(record) => records.push(record),
                        _ => {
                            return Err(TransferError::invalid(format!(
                                "{}.{field}: composition members must be inline records",
                                node.target.entity_type
                            )));
                        }
                    }
                }
                self.replace_members(node, field, member_type, policy, current, records)?
            }
            MultiPayload::Actions(actions) => {
                let mut keyed: Vec<(FunctionalKey, Member)> = current
                    .into_iter()
                    .map(|(key, child)| (key, Member::Keep(child.link())))
                    .collect();
                let mut next_ordinal = keyed.len();
                for action in actions {
                    self.apply_composition_action(
                        node,
                        field,
                        member_type,
                        &mut keyed,
                        &mut next_ordinal,
                        action,
                    )?;
                }
                keyed.into_iter().map(|(_, member)| member).collect()
            }
        };
        node.compositions.insert(field.to_string(), members);
        Ok(())
    }

    /// Full member list: keyed members are matched and updated in place,
    /// keyless ones are always recreated.
    fn replace_members(
        &mut self,
        node: &mut PendingNode,
        field: &str,
        member_type: &str,
        policy: CompositionPolicy,
        current: Vec<(FunctionalKey, Entity)>,
        records: Vec<Record>,
    ) -> TransferResult<Vec<Member>> {
        let mut members = Vec::with_capacity(records.len());
        match policy {
            CompositionPolicy::ForceRecreate => {
                node.deletes
                    .extend(current.into_iter().map(|(_, child)| child.link()));
                for (ordinal, record) in records.iter().enumerate() {
                    let (_, member) =
                        self.build_member(&node.target, field, member_type, ordinal, record, None)?;
                    members.push(member);
                }
            }
            CompositionPolicy::ReconcileByKey => {
                let mut remaining = current;
                for (ordinal, record) in records.iter().enumerate() {
                    let matched = remaining.iter().position(|(key, _)| key == &record.key);
                    let existing = matched.map(|i| remaining.remove(i).1);
                    let (_, member) =
                        self.build_member(&node.target, field, member_type, ordinal, record, existing)?;
                    members.push(member);
                }
                node.deletes
                    .extend(remaining.into_iter().map(|(_, child)| child.link()));
            }
        }
        Ok(members)
    }

    fn apply_composition_action(
        &mut self,
        node: &mut PendingNode,
        field: &str,
        member_type: &str,
        keyed: &mut Vec<(FunctionalKey, Member)>,
        next_ordinal: &mut usize,
        action: Action,
    ) -> TransferResult<()> {
        match action {
            Action::Create(records) => {
                for record in &records {
                    if !record.key.is_empty() && keyed.iter().any(|(k, _)| k == &record.key) {
                        return Err(TransferError::invalid(format!(
                            "{}.{field} already has a member with key {}",
                            node.target.entity_type, record.key
                        )));
                    }
                    // Ordinals never repeat, even after deletes in the same list.
                    let ordinal = *next_ordinal;
                    *next_ordinal += 1;
                    let (key, member) =
                        self.build_member(&node.target, field, member_type, ordinal, record, None)?;
                    keyed.push((key, member));
                }
            }
            Action::Write { keys, values } => {
                let fields = self.scalar_fields(member_type, &values)?;
                for key in keys {
                    let Some((_, member)) = keyed.iter_mut().find(|(k, _)| k == &key) else {
                        return Err(TransferError::invalid(format!(
                            "{}.{field} has no member with key {key}",
                            node.target.entity_type
                        )));
                    };
                    match member {
                        Member::Node(child) => child.values.extend(fields.clone()),
                        Member::Keep(link) => {
                            let current = self.repo.get(link)?.ok_or_else(|| {
                                TransferError::Internal(format!("member {}/{} vanished", link.entity_type, link.id))
                            })?;
                            let mut child =
                                PendingNode::new(TargetRef::new(member_type, key.clone()), Some(current));
                            child.values = fields.clone();
                            *member = Member::Node(child);
                        }
                    }
                }
            }
            Action::Delete(keys) => {
                for key in keys {
                    let Some(i) = keyed.iter().position(|(k, _)| k == &key) else {
                        continue;
                    };
                    match keyed.remove(i).1 {
                        Member::Keep(link) => node.deletes.push(link),
                        Member::Node(child) => {
                            if let Some(existing) = child.existing {
                                node.deletes.push(existing.link());
                            }
                        }
                    }
                }
            }
            Action::Add(_) | Action::Remove(_) => {
                return Err(TransferError::invalid(format!(
                    "{} is not valid on composition {}.{field}",
                    action.name(),
                    node.target.entity_type
                )));
            }
        }
        Ok(())
    }

    fn build_member(
        &mut self,
        owner: &TargetRef,
        field: &str,
        member_type: &str,
        ordinal: usize,
        record: &Record,
        existing: Option<Entity>,
    ) -> TransferResult<(FunctionalKey, Member)> {
        if record.entity_type != member_type {
            return Err(TransferError::invalid(format!(
                "{}.{field} holds {member_type} members, got {}",
                owner.entity_type, record.entity_type
            )));
        }
        if !self.registry.capabilities(member_type)?.keyed {
            let key = FunctionalKey::synthetic(&owner.key, field, ordinal);
            let node = self.build_node(record, TargetRef::new(member_type, key.clone()), existing)?;
            return Ok((key, Member::Node(node)));
        }

        if record.key.is_empty() {
            return Err(TransferError::invalid(format!(
                "{member_type} member of {}.{field} has no {KEY_FIELD}",
                owner.entity_type
            )));
        }
        let target = TargetRef::new(member_type, record.key.clone());
        if !self.seen.insert(target.clone()) {
            // Already materialized elsewhere in the document: only a bare
            // key may point back at it.
            if !record.fields.is_empty() {
                return Err(TransferError::DuplicateRecord {
                    entity_type: target.entity_type,
                    key: target.key,
                });
            }
            let link = self.ledger.link(&target).ok_or_else(|| {
                TransferError::invalid(format!(
                    "member {target} of {}.{field} is not materialized yet",
                    owner.entity_type
                ))
            })?;
            debug!(owner = %owner, field, member = %target, "Reusing materialized member");
            return Ok((target.key, Member::Keep(link)));
        }

        let existing = match existing {
            Some(entity) => Some(entity),
            None => self.find_unique(&target)?,
        };
        let mut node = self.build_node(record, target.clone(), existing)?;
        node.register = true;
        Ok((target.key, Member::Node(node)))
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Writes a unit: composition children first, then the record, then
    /// deletions. Links still open are queued for relinking.
    fn persist(&mut self, node: PendingNode) -> TransferResult<Entity> {
        let PendingNode {
            target,
            existing,
            mut values,
            links,
            deferred,
            compositions,
            deletes,
            register,
        } = node;

        for (field, members) in compositions {
            let mut children = Vec::with_capacity(members.len());
            for member in members {
                children.push(match member {
                    Member::Keep(link) => link,
                    Member::Node(child) => self.persist(child)?.link(),
                });
            }
            values.insert(field, FieldValue::Links(children));
        }

        for (field, slot) in &links {
            // An existing record keeps its current value until relinked.
            let open = deferred.iter().any(|d| &d.field == field);
            if open && existing.is_some() && slot.is_single() {
                continue;
            }
            values.insert(field.clone(), slot.to_field_value());
        }

        let entity = match &existing {
            Some(current) => {
                let entity = self.repo.update(current, values)?;
                self.track_updated(&entity);
                entity
            }
            None => {
                let entity = self.repo.create(&target.entity_type, values)?;
                self.track_created(&entity);
                entity
            }
        };
        debug!(entity_type = %target.entity_type, key = %target.key, id = %entity.id, "Persisted record");
        if register {
            self.ledger.insert(&target, entity.clone())?;
            self.registered.push(target.clone());
        }

        if !deletes.is_empty() {
            debug!(owner = %target, count = deletes.len(), "Deleting detached records");
            self.repo.delete(&deletes)?;
            self.deleted.extend(deletes);
        }
        if !deferred.is_empty() {
            let id = self.queue.push(RelinkEntry::Persisted {
                owner: target,
                link: entity.link(),
                links,
                deferred,
            });
            self.fresh.push(id);
        }
        Ok(entity)
    }

    fn track_created(&mut self, entity: &Entity) {
        if self.touched.insert(entity.id) {
            self.created.push(entity.link());
        }
    }

    fn track_updated(&mut self, entity: &Entity) {
        if self.touched.insert(entity.id) {
            self.updated.push(entity.link());
        }
    }

    // ── Phase C ──────────────────────────────────────────────────────

    fn reload(&self, links: &[LinkRef]) -> TransferResult<BTreeMap<String, Vec<Entity>>> {
        let mut by_type: BTreeMap<String, Vec<Entity>> = BTreeMap::new();
        for link in links {
            if let Some(entity) = self.repo.get(link)? {
                by_type.entry(link.entity_type.clone()).or_default().push(entity);
            }
        }
        Ok(by_type)
    }

    fn complete(mut self) -> TransferResult<ImportOutcome> {
        if self.config.run_post_import {
            let mut touched = self.reload(&self.created)?;
            for (entity_type, records) in self.reload(&self.updated)? {
                touched.entry(entity_type).or_default().extend(records);
            }
            for (entity_type, records) in &touched {
                debug!(entity_type = %entity_type, records = records.len(), "Running post-import hook");
                self.repo.post_import(entity_type, records)?;
            }
        }

        if !self.queue.is_empty() {
            return Err(TransferError::Internal(format!(
                "relink queue still holds {} entries after import",
                self.queue.len()
            )));
        }

        let created = self.reload(&self.created)?;
        let updated = self.reload(&self.updated)?;
        let repo = &*self.repo;
        self.ledger
            .refresh(|entity| Ok(repo.get(&entity.link())?))?;

        let outcome = ImportOutcome {
            ledger: self.ledger,
            created,
            updated,
            deleted: self.deleted,
            stats: self.stats,
        };
        info!(
            created = outcome.created_count(),
            updated = outcome.updated_count(),
            deleted = outcome.deleted.len(),
            relink_passes = outcome.stats.passes,
            "Import finished"
        );
        Ok(outcome)
    }
}
