//! Per-identity filtering of the ref advertisement.
//!
//! Everything a fetch can see flows through here. The filter is a pure
//! function of the ref snapshot it is given plus review state: the same
//! viewer and the same snapshot always produce the same advertisement.
//!
//! Rules, in order of specificity:
//! - `refs/changes/<NN>/<n>/<ps>` follows its change: destination branch
//!   readable, private changes owner-only, drafts owner-and-reviewers.
//! - `.../meta` additionally requires the metadata write-path to be on.
//! - `refs/users/<NN>/<id>/edit-*` is creator-only.
//! - Branches and other plain refs need direct read access.
//! - Tags fall back to reachability: a tag on a commit an allowed branch
//!   contains is visible even without a direct rule.
//! - `access-database` bypasses all of it.

use gantry_git::{GitError, GitOid, GitRepo, RefName};

use crate::model::{self, AccountId, Change, ChangeStatus, ReviewRef};
use crate::perm::PermissionBackend;
use crate::store::ChangeStore;

/// The advertisement filter for one project.
pub struct RefVisibility<'a> {
    repo: &'a dyn GitRepo,
    store: &'a dyn ChangeStore,
    perms: &'a dyn PermissionBackend,
    meta_refs: bool,
}

impl<'a> RefVisibility<'a> {
    pub fn new(
        repo: &'a dyn GitRepo,
        store: &'a dyn ChangeStore,
        perms: &'a dyn PermissionBackend,
        meta_refs: bool,
    ) -> Self {
        Self {
            repo,
            store,
            perms,
            meta_refs,
        }
    }

    /// Snapshot the repository and filter it for `viewer`. `HEAD` is
    /// prepended when its target branch made it through.
    pub fn advertisement(&self, viewer: AccountId) -> Result<Vec<(RefName, GitOid)>, GitError> {
        let snapshot = self.repo.list_refs("")?;
        let mut visible = self.filter(&snapshot, viewer)?;
        if let Some(target) = self.repo.head_target()? {
            if let Some(oid) = visible
                .iter()
                .find(|(name, _)| *name == target)
                .map(|(_, oid)| *oid)
            {
                visible.insert(0, (RefName::head(), oid));
            }
        }
        Ok(visible)
    }

    /// Filter an externally taken snapshot. Order is preserved.
    pub fn filter(
        &self,
        refs: &[(RefName, GitOid)],
        viewer: AccountId,
    ) -> Result<Vec<(RefName, GitOid)>, GitError> {
        if self.perms.can_access_database(viewer) {
            return Ok(refs
                .iter()
                .filter(|(name, _)| self.meta_refs || !is_meta(name))
                .cloned()
                .collect());
        }

        let mut visible = Vec::new();
        let mut deferred_tags: Vec<(RefName, GitOid)> = Vec::new();
        let mut branch_roots: Vec<GitOid> = Vec::new();

        for (name, oid) in refs {
            let keep = match model::parse_review_ref(name) {
                Some(ReviewRef::PatchSet(id)) => {
                    self.change_visible(self.store.get(id.change).as_ref(), viewer)
                }
                Some(ReviewRef::Meta(number)) => {
                    self.meta_refs
                        && self.change_visible(self.store.get(number).as_ref(), viewer)
                }
                Some(ReviewRef::Edit {
                    account,
                    patch_set,
                }) => {
                    (account == viewer || self.perms.can_view_private_changes(viewer))
                        && self.change_visible(self.store.get(patch_set.change).as_ref(), viewer)
                }
                None => {
                    if self.perms.can_read(viewer, name) {
                        if name.as_str().starts_with("refs/heads/") {
                            branch_roots.push(*oid);
                        }
                        true
                    } else {
                        if name.as_str().starts_with("refs/tags/") {
                            deferred_tags.push((name.clone(), *oid));
                        }
                        false
                    }
                }
            };
            if keep {
                visible.push((name.clone(), *oid));
            }
        }

        // Tags with no direct grant are still shown when a visible branch
        // already contains them.
        let mut reinstated = Vec::new();
        for (name, oid) in deferred_tags {
            for root in &branch_roots {
                if self.repo.is_ancestor(oid, *root)? {
                    reinstated.push((name, oid));
                    break;
                }
            }
        }
        if !reinstated.is_empty() {
            visible.extend(reinstated);
            visible.sort_by(|a, b| a.0.cmp(&b.0));
        }
        Ok(visible)
    }

    fn change_visible(&self, change: Option<&Change>, viewer: AccountId) -> bool {
        let Some(change) = change else {
            // A review ref with no tracked change stays hidden rather than
            // leaking whatever it points at.
            return false;
        };
        if !self.perms.can_read(viewer, &change.dest) {
            return false;
        }
        if change.private && change.owner != viewer {
            return self.perms.can_view_private_changes(viewer);
        }
        if change.status == ChangeStatus::Draft
            && change.owner != viewer
            && !change.reviewers.contains(&viewer)
            && !change.ccs.contains(&viewer)
        {
            return self.perms.can_view_private_changes(viewer);
        }
        true
    }
}

fn is_meta(name: &RefName) -> bool {
    matches!(model::parse_review_ref(name), Some(ReviewRef::Meta(_)))
}
