//! Records under construction during an import.
//!
//! A [`PendingNode`] is one record plus the composition children nested in
//! it. The top-level node and its children are persisted together or not
//! at all.

use crate::error::PendingLink;
use crate::ledger::TargetRef;
use graphport_model::{Entity, FieldMap, FieldValue, LinkRef};
use serde_json::Value;
use std::collections::BTreeMap;

/// Link value being assembled. `None` entries are still deferred.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LinkSlot {
    Single(Option<LinkRef>),
    Many(Vec<Option<LinkRef>>),
}

impl LinkSlot {
    fn fill(&mut self, index: usize, link: LinkRef) {
        match self {
            LinkSlot::Single(slot) => *slot = Some(link),
            LinkSlot::Many(slots) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(link);
                }
            }
        }
    }

    pub(crate) fn to_field_value(&self) -> FieldValue {
        match self {
            LinkSlot::Single(link) => FieldValue::Link(link.clone()),
            LinkSlot::Many(links) => FieldValue::Links(links.iter().flatten().cloned().collect()),
        }
    }

    pub(crate) fn is_single(&self) -> bool {
        matches!(self, LinkSlot::Single(_))
    }
}

/// A link whose target was not resolvable yet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Deferred {
    pub field: String,
    /// Position in a `Many` slot; 0 for single links.
    pub index: usize,
    pub target: TargetRef,
    pub required: bool,
}

impl Deferred {
    pub(crate) fn new(field: &str, index: usize, target: TargetRef) -> Self {
        Self {
            field: field.to_string(),
            index,
            target,
            required: false,
        }
    }

    pub(crate) fn describe(&self, owner: &TargetRef) -> PendingLink {
        PendingLink {
            owner_type: owner.entity_type.clone(),
            owner_key: owner.key.clone(),
            field: self.field.clone(),
            target_type: self.target.entity_type.clone(),
            target_key: self.target.key.clone(),
            required: self.required,
        }
    }
}

/// Fills every deferred link `lookup` can resolve. Returns the fields
/// that changed, once per resolved link.
pub(crate) fn fill_deferred<F>(
    links: &mut BTreeMap<String, LinkSlot>,
    deferred: &mut Vec<Deferred>,
    lookup: &mut F,
) -> Vec<String>
where
    F: FnMut(&TargetRef) -> Option<LinkRef>,
{
    let mut touched = Vec::new();
    deferred.retain(|d| match lookup(&d.target) {
        Some(link) => {
            if let Some(slot) = links.get_mut(&d.field) {
                slot.fill(d.index, link);
            }
            touched.push(d.field.clone());
            false
        }
        None => true,
    });
    touched
}

/// Member of a composition after reconciliation.
#[derive(Debug)]
pub(crate) enum Member {
    /// Existing child left untouched.
    Keep(LinkRef),
    /// Child to create or update.
    Node(PendingNode),
}

#[derive(Debug)]
pub(crate) struct PendingNode {
    pub target: TargetRef,
    pub existing: Option<Entity>,
    /// Scalars and explicit nulls.
    pub values: FieldMap,
    pub links: BTreeMap<String, LinkSlot>,
    pub deferred: Vec<Deferred>,
    pub compositions: BTreeMap<String, Vec<Member>>,
    /// Records to delete once this node is written.
    pub deletes: Vec<LinkRef>,
    /// Keyed composition member: enters the ledger once persisted.
    pub register: bool,
}

impl PendingNode {
    pub(crate) fn new(target: TargetRef, existing: Option<Entity>) -> Self {
        Self {
            target,
            existing,
            values: FieldMap::new(),
            links: BTreeMap::new(),
            deferred: Vec::new(),
            compositions: BTreeMap::new(),
            deletes: Vec::new(),
            register: false,
        }
    }

    pub(crate) fn is_new(&self) -> bool {
        self.existing.is_none()
    }

    /// Scalar as the record will hold it: incoming value first, then the
    /// stored one.
    pub(crate) fn scalar(&self, field: &str) -> Option<Value> {
        match self.values.get(field) {
            Some(FieldValue::Scalar(v)) => Some(v.clone()),
            _ => self
                .existing
                .as_ref()
                .and_then(|e| e.get_scalar(field))
                .cloned(),
        }
    }

    fn children(&self) -> impl Iterator<Item = &PendingNode> {
        self.compositions.values().flatten().filter_map(|m| match m {
            Member::Node(child) => Some(child),
            Member::Keep(_) => None,
        })
    }

    fn children_mut(&mut self) -> impl Iterator<Item = &mut PendingNode> {
        self.compositions.values_mut().flatten().filter_map(|m| match m {
            Member::Node(child) => Some(child),
            Member::Keep(_) => None,
        })
    }

    /// True while a new node in this unit waits on a required link.
    pub(crate) fn blocked(&self) -> bool {
        (self.is_new() && self.deferred.iter().any(|d| d.required))
            || self.children().any(PendingNode::blocked)
    }

    /// Fills resolvable deferred links throughout the unit. Returns how
    /// many were filled.
    pub(crate) fn resolve<F>(&mut self, lookup: &mut F) -> usize
    where
        F: FnMut(&TargetRef) -> Option<LinkRef>,
    {
        let mut filled = fill_deferred(&mut self.links, &mut self.deferred, lookup).len();
        for child in self.children_mut() {
            filled += child.resolve(lookup);
        }
        filled
    }

    /// Targets this unit is still waiting on.
    pub(crate) fn waiting_on(&self, out: &mut Vec<TargetRef>) {
        out.extend(self.deferred.iter().map(|d| d.target.clone()));
        for child in self.children() {
            child.waiting_on(out);
        }
    }

    pub(crate) fn pending_links(&self, out: &mut Vec<PendingLink>) {
        out.extend(self.deferred.iter().map(|d| d.describe(&self.target)));
        for child in self.children() {
            child.pending_links(out);
        }
    }
}
