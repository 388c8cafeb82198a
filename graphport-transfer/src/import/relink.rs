//! Deferred link resolution (import phase B).
//!
//! Entries stay in insertion order and only ever shrink. Each pass retries
//! the dirty entries: all of them on the first pass, afterwards only the
//! waiters of targets registered during the previous pass (plus entries
//! queued meanwhile). A pass without progress means the remaining links
//! can never resolve.

use super::unit::{fill_deferred, Deferred, LinkSlot, PendingNode};
use super::Importer;
use crate::error::{PendingLink, TransferError, TransferResult};
use crate::ledger::TargetRef;
use graphport_model::{FieldMap, LinkRef};
use graphport_storage::Repository;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug)]
pub(crate) enum RelinkEntry {
    /// Blocked unit, not persisted yet.
    Transient(PendingNode),
    /// Persisted record with optional links still open.
    Persisted {
        owner: TargetRef,
        link: LinkRef,
        links: BTreeMap<String, LinkSlot>,
        deferred: Vec<Deferred>,
    },
}

impl RelinkEntry {
    fn waiting_on(&self) -> Vec<TargetRef> {
        let mut targets = Vec::new();
        match self {
            RelinkEntry::Transient(node) => node.waiting_on(&mut targets),
            RelinkEntry::Persisted { deferred, .. } => {
                targets.extend(deferred.iter().map(|d| d.target.clone()));
            }
        }
        targets
    }

    fn pending_links(&self, out: &mut Vec<PendingLink>) {
        match self {
            RelinkEntry::Transient(node) => node.pending_links(out),
            RelinkEntry::Persisted {
                owner, deferred, ..
            } => out.extend(deferred.iter().map(|d| d.describe(owner))),
        }
    }
}

/// Insertion-ordered queue of deferred work with a reverse index from
/// each awaited target to the entries waiting on it.
#[derive(Debug, Default)]
pub(crate) struct RelinkQueue {
    entries: BTreeMap<usize, RelinkEntry>,
    waiting: HashMap<TargetRef, BTreeSet<usize>>,
    next_id: usize,
}

impl RelinkQueue {
    pub(crate) fn push(&mut self, entry: RelinkEntry) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        for target in entry.waiting_on() {
            self.waiting.entry(target).or_default().insert(id);
        }
        self.entries.insert(id, entry);
        id
    }

    /// Removes an entry for retrying. Its index entries stay; stale ids
    /// are filtered on lookup.
    fn take(&mut self, id: usize) -> Option<RelinkEntry> {
        self.entries.remove(&id)
    }

    fn restore(&mut self, id: usize, entry: RelinkEntry) {
        self.entries.insert(id, entry);
    }

    fn ids(&self) -> BTreeSet<usize> {
        self.entries.keys().copied().collect()
    }

    /// Live entries waiting on any of `targets`.
    fn waiters(&self, targets: &[TargetRef]) -> BTreeSet<usize> {
        targets
            .iter()
            .filter_map(|t| self.waiting.get(t))
            .flatten()
            .copied()
            .filter(|id| self.entries.contains_key(id))
            .collect()
    }

    /// Number of entries ever queued.
    pub(crate) fn queued(&self) -> usize {
        self.next_id
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn pending_links(&self) -> Vec<PendingLink> {
        let mut out = Vec::new();
        for entry in self.entries.values() {
            entry.pending_links(&mut out);
        }
        out
    }
}

enum Retry {
    Done,
    Waiting { entry: RelinkEntry, progressed: bool },
}

impl<R: Repository + ?Sized> Importer<'_, R> {
    /// Runs relink passes until the queue drains.
    pub(super) fn relink(&mut self) -> TransferResult<()> {
        let mut dirty = self.queue.ids();
        self.fresh.clear();
        self.registered.clear();

        while !self.queue.is_empty() {
            if dirty.is_empty() || self.stats.passes >= self.config.max_relink_passes {
                return Err(self.stalled());
            }
            self.stats.passes += 1;

            let mut progressed = false;
            for id in std::mem::take(&mut dirty) {
                let Some(entry) = self.queue.take(id) else {
                    continue;
                };
                match self.retry(entry)? {
                    Retry::Done => progressed = true,
                    Retry::Waiting {
                        entry,
                        progressed: partial,
                    } => {
                        progressed |= partial;
                        self.queue.restore(id, entry);
                    }
                }
            }

            let registered = std::mem::take(&mut self.registered);
            debug!(
                pass = self.stats.passes,
                registered = registered.len(),
                remaining = self.queue.len(),
                "Relink pass finished"
            );
            if !progressed {
                return Err(self.stalled());
            }
            dirty = self.queue.waiters(&registered);
            dirty.extend(self.fresh.drain(..));
        }
        Ok(())
    }

    fn retry(&mut self, entry: RelinkEntry) -> TransferResult<Retry> {
        match entry {
            RelinkEntry::Transient(mut node) => {
                let ledger = &self.ledger;
                let filled = node.resolve(&mut |t| ledger.link(t));
                self.stats.resolved += filled;
                if node.blocked() {
                    return Ok(Retry::Waiting {
                        entry: RelinkEntry::Transient(node),
                        progressed: filled > 0,
                    });
                }

                let target = node.target.clone();
                debug!(entity_type = %target.entity_type, key = %target.key, "Required links resolved, persisting");
                let entity = self.persist(node)?;
                self.ledger.insert(&target, entity)?;
                self.registered.push(target);
                Ok(Retry::Done)
            }
            RelinkEntry::Persisted {
                owner,
                link,
                mut links,
                mut deferred,
            } => {
                let ledger = &self.ledger;
                let touched = fill_deferred(&mut links, &mut deferred, &mut |t| ledger.link(t));
                self.stats.resolved += touched.len();
                if !touched.is_empty() {
                    let fields: FieldMap = touched
                        .iter()
                        .filter_map(|f| links.get(f).map(|slot| (f.clone(), slot.to_field_value())))
                        .collect();
                    debug!(entity_type = %owner.entity_type, key = %owner.key, fields = touched.len(), "Relinking persisted record");
                    self.write_links(&link, fields)?;
                }
                if deferred.is_empty() {
                    return Ok(Retry::Done);
                }
                Ok(Retry::Waiting {
                    progressed: !touched.is_empty(),
                    entry: RelinkEntry::Persisted {
                        owner,
                        link,
                        links,
                        deferred,
                    },
                })
            }
        }
    }

    fn write_links(&mut self, link: &LinkRef, fields: FieldMap) -> TransferResult<()> {
        let current = self
            .repo
            .get(link)?
            .ok_or_else(|| TransferError::Internal(format!("relinked record {}/{} vanished", link.entity_type, link.id)))?;
        let updated = self.repo.update(&current, fields)?;
        self.track_updated(&updated);
        Ok(())
    }

    fn stalled(&self) -> TransferError {
        TransferError::UnresolvableCycle {
            pending: self.queue.pending_links(),
        }
    }
}
