//! Persistence of review state.
//!
//! Changes, patch sets, and approvals live behind [`ChangeStore`]. The git
//! side of a change (its commits and `refs/changes/` refs) stays in the
//! project repository; this store holds the review bookkeeping keyed by
//! change number.
//!
//! An open change is unique per `(project, destination, Change-Id)` triple:
//! the same Change-Id pushed to another branch tracks a separate change.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use gantry_git::RefName;

use crate::model::{Approval, Change, ChangeId, ChangeNumber, PatchSet, PatchSetId};

/// Storage for review state. Implementations are internally synchronized;
/// all methods take `&self`.
pub trait ChangeStore: Send + Sync {
    /// Allocate the next change number. Numbers are never reused.
    fn next_change_number(&self) -> ChangeNumber;

    /// The change tracked for this identity on this destination, if any.
    fn by_change_id(&self, project: &str, dest: &RefName, id: &ChangeId) -> Option<Change>;

    /// Look up a change by number.
    fn get(&self, number: ChangeNumber) -> Option<Change>;

    /// Insert or replace a change record.
    fn put_change(&self, change: Change);

    /// Record a patch set.
    fn add_patch_set(&self, patch_set: PatchSet);

    /// All patch sets of a change, in sequence order.
    fn patch_sets(&self, number: ChangeNumber) -> Vec<PatchSet>;

    /// Record a vote, replacing any prior vote by the same account on the
    /// same label of the same patch set.
    fn add_approval(&self, approval: Approval);

    /// All votes on one patch set.
    fn approvals(&self, id: PatchSetId) -> Vec<Approval>;
}

/// In-memory store, for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemChangeStore {
    inner: Mutex<MemStoreInner>,
}

#[derive(Debug, Default)]
struct MemStoreInner {
    next_number: u32,
    changes: BTreeMap<ChangeNumber, Change>,
    patch_sets: BTreeMap<ChangeNumber, Vec<PatchSet>>,
    approvals: BTreeMap<PatchSetId, Vec<Approval>>,
}

impl MemChangeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeStore for MemChangeStore {
    fn next_change_number(&self) -> ChangeNumber {
        let mut inner = self.lock();
        inner.next_number += 1;
        ChangeNumber(inner.next_number)
    }

    fn by_change_id(&self, project: &str, dest: &RefName, id: &ChangeId) -> Option<Change> {
        self.lock()
            .changes
            .values()
            .find(|c| c.project == project && &c.dest == dest && &c.id == id)
            .cloned()
    }

    fn get(&self, number: ChangeNumber) -> Option<Change> {
        self.lock().changes.get(&number).cloned()
    }

    fn put_change(&self, change: Change) {
        self.lock().changes.insert(change.number, change);
    }

    fn add_patch_set(&self, patch_set: PatchSet) {
        let mut inner = self.lock();
        let sets = inner.patch_sets.entry(patch_set.id.change).or_default();
        sets.retain(|ps| ps.id != patch_set.id);
        sets.push(patch_set);
        sets.sort_by_key(|ps| ps.id.number);
    }

    fn patch_sets(&self, number: ChangeNumber) -> Vec<PatchSet> {
        self.lock().patch_sets.get(&number).cloned().unwrap_or_default()
    }

    fn add_approval(&self, approval: Approval) {
        let mut inner = self.lock();
        let votes = inner.approvals.entry(approval.patch_set).or_default();
        votes.retain(|a| !(a.label == approval.label && a.account == approval.account));
        votes.push(approval);
    }

    fn approvals(&self, id: PatchSetId) -> Vec<Approval> {
        self.lock().approvals.get(&id).cloned().unwrap_or_default()
    }
}
