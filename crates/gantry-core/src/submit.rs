//! Submit-on-push: integrating an accepted patch set into its destination
//! branch in the same receive.
//!
//! Submit serializes on the destination ref. The candidate tip is built
//! against a snapshot of the branch, then installed with a compare-and-swap;
//! losing the swap re-reads the branch and rebuilds once before giving up.
//! A failed submit leaves the change open with its patch set intact — only
//! the integration is refused, never the intake that preceded it.

use gantry_git::{GitOid, GitRepo, NewCommit, Persona, RefEdit, RefTransition};

use crate::error::RejectReason;
use crate::intake::ChangeUpdate;
use crate::merge::{self, Resolution};
use crate::model::{self, AccountId, Approval, Change, ChangeStatus, PatchSet, PatchSetId};
use crate::perm::PermissionBackend;
use crate::project::{ProjectConfig, SubmitType};
use crate::store::ChangeStore;

/// How a submit request ended.
#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    /// The branch now contains the change.
    Merged {
        /// The new destination branch tip.
        new_tip: GitOid,
        /// The patch set that was integrated. Under cherry-pick this is a
        /// newly created patch set, not the one pushed.
        patch_set: PatchSetId,
    },
    /// The strategy could not reconcile the change with the branch. The
    /// change stays open.
    Conflict(RejectReason),
    /// The pusher may not submit here, or the change is a draft.
    NotAllowed(RejectReason),
}

/// Deployment-level inputs to submit: the identity that authors integration
/// commits, the origin URL recorded in cherry-pick footers, and whether
/// cherry-picked patch sets inherit votes.
#[derive(Clone, Debug)]
pub struct SubmitEnv {
    /// Committer for integration commits. Original authors are preserved.
    pub service: Persona,
    /// Canonical origin, e.g. `https://review.example.com`, with no trailing
    /// slash.
    pub canonical_origin: String,
    /// Copy the pushed patch set's votes onto the cherry-picked one.
    pub copy_votes_on_cherry_pick: bool,
}

/// The submit operation over one project.
pub struct SubmitOnPush<'a> {
    repo: &'a dyn GitRepo,
    store: &'a dyn ChangeStore,
    perms: &'a dyn PermissionBackend,
    project: &'a ProjectConfig,
    env: &'a SubmitEnv,
}

enum Candidate {
    /// Advance the branch to this existing commit.
    FastForward(GitOid),
    /// A freshly built merge commit.
    Merge(GitOid),
    /// A freshly built replay of the change; becomes a new patch set.
    CherryPick(GitOid),
}

impl Candidate {
    const fn tip(&self) -> GitOid {
        match self {
            Self::FastForward(oid) | Self::Merge(oid) | Self::CherryPick(oid) => *oid,
        }
    }
}

impl<'a> SubmitOnPush<'a> {
    pub fn new(
        repo: &'a dyn GitRepo,
        store: &'a dyn ChangeStore,
        perms: &'a dyn PermissionBackend,
        project: &'a ProjectConfig,
        env: &'a SubmitEnv,
    ) -> Self {
        Self {
            repo,
            store,
            perms,
            project,
            env,
        }
    }

    /// Try to integrate the patch set accepted by `update`.
    pub fn submit(
        &self,
        update: &ChangeUpdate,
        pusher: AccountId,
    ) -> Result<SubmitOutcome, RejectReason> {
        let change = &update.change;
        if change.status == ChangeStatus::Draft {
            return Ok(SubmitOutcome::NotAllowed(RejectReason::CannotSubmitDraft));
        }
        if !self.perms.can_submit(pusher, &change.dest) {
            return Ok(SubmitOutcome::NotAllowed(RejectReason::SubmitNotAllowed));
        }

        for attempt in 0..2 {
            if attempt > 0 {
                tracing::debug!(dest = change.dest.as_str(), "submit lost the swap, rebuilding");
            }
            let tip = self.repo.read_ref(&change.dest)?;
            let candidate = match self.build(tip, change, &update.patch_set)? {
                Ok(candidate) => candidate,
                Err(reason) => return Ok(SubmitOutcome::Conflict(reason)),
            };
            let transition = self.repo.update_ref(&RefEdit {
                name: change.dest.clone(),
                new_oid: candidate.tip(),
                expected_old_oid: tip.unwrap_or(GitOid::ZERO),
            })?;
            if matches!(transition, RefTransition::LockFailure) {
                continue;
            }
            if !transition.is_applied() {
                return Ok(SubmitOutcome::Conflict(RejectReason::LockFailure {
                    name: change.dest.as_str().to_owned(),
                }));
            }
            return Ok(self.finalize(update, candidate, pusher)?);
        }
        Ok(SubmitOutcome::Conflict(RejectReason::LockFailure {
            name: change.dest.as_str().to_owned(),
        }))
    }

    /// Build the candidate tip for the current branch snapshot. The outer
    /// error is infrastructure; the inner one is a merge refusal.
    fn build(
        &self,
        tip: Option<GitOid>,
        change: &Change,
        patch_set: &PatchSet,
    ) -> Result<Result<Candidate, RejectReason>, RejectReason> {
        let Some(tip) = tip else {
            // Unborn branch: every strategy degenerates to installing the
            // patch set commit itself.
            return Ok(Ok(Candidate::FastForward(patch_set.commit)));
        };
        if tip == patch_set.commit {
            return Ok(Ok(Candidate::FastForward(patch_set.commit)));
        }
        let fast_forwardable = self.repo.is_ancestor(tip, patch_set.commit)?;
        match self.project.submit_type {
            SubmitType::FastForwardOnly => {
                if fast_forwardable {
                    Ok(Ok(Candidate::FastForward(patch_set.commit)))
                } else {
                    Ok(Err(RejectReason::FastForwardRequired))
                }
            }
            SubmitType::MergeIfNecessary if fast_forwardable => {
                Ok(Ok(Candidate::FastForward(patch_set.commit)))
            }
            SubmitType::MergeIfNecessary | SubmitType::MergeAlways => {
                self.build_merge(tip, change, patch_set)
            }
            SubmitType::CherryPick => self.build_cherry_pick(tip, change, patch_set),
        }
    }

    fn build_merge(
        &self,
        tip: GitOid,
        change: &Change,
        patch_set: &PatchSet,
    ) -> Result<Result<Candidate, RejectReason>, RejectReason> {
        let base = self.repo.merge_base(tip, patch_set.commit)?;
        let tip_info = self.repo.read_commit(tip)?;
        let ps_info = self.repo.read_commit(patch_set.commit)?;

        let base_tree = match base {
            Some(base) => Some(self.repo.read_commit(base)?.tree_oid),
            None => None,
        };
        let base_flat = merge::flatten(self.repo, base_tree)?;
        let ours_flat = merge::flatten(self.repo, Some(tip_info.tree_oid))?;
        let theirs_flat = merge::flatten(self.repo, Some(ps_info.tree_oid))?;

        let edits = match merge::three_way(&base_flat, &ours_flat, &theirs_flat) {
            Resolution::Conflicts(paths) => {
                return Ok(Err(RejectReason::PathConflict { paths }));
            }
            Resolution::Clean(edits) => edits,
        };
        let merged_tree = if edits.is_empty() {
            tip_info.tree_oid
        } else {
            self.repo.edit_tree(tip_info.tree_oid, &edits)?
        };

        let mut message = format!("Merge \"{}\"", ps_info.subject());
        if change.dest_branch() != "master" {
            message.push_str(" into ");
            message.push_str(change.dest_branch());
        }
        message.push('\n');

        let commit = self.repo.create_commit(&NewCommit {
            tree_oid: merged_tree,
            parents: vec![tip, patch_set.commit],
            message,
            author: Persona::parse(&ps_info.author, self.env.service.when),
            committer: self.env.service.clone(),
        })?;
        Ok(Ok(Candidate::Merge(commit)))
    }

    fn build_cherry_pick(
        &self,
        tip: GitOid,
        change: &Change,
        patch_set: &PatchSet,
    ) -> Result<Result<Candidate, RejectReason>, RejectReason> {
        let tip_info = self.repo.read_commit(tip)?;
        let ps_info = self.repo.read_commit(patch_set.commit)?;
        let parent_tree = match ps_info.parents.first() {
            Some(parent) => Some(self.repo.read_commit(*parent)?.tree_oid),
            None => None,
        };

        let base_flat = merge::flatten(self.repo, parent_tree)?;
        let ours_flat = merge::flatten(self.repo, Some(tip_info.tree_oid))?;
        let theirs_flat = merge::flatten(self.repo, Some(ps_info.tree_oid))?;

        let edits = match merge::three_way(&base_flat, &ours_flat, &theirs_flat) {
            Resolution::Conflicts(paths) => {
                return Ok(Err(RejectReason::PathConflict { paths }));
            }
            Resolution::Clean(edits) => edits,
        };
        let merged_tree = if edits.is_empty() {
            tip_info.tree_oid
        } else {
            self.repo.edit_tree(tip_info.tree_oid, &edits)?
        };

        let mut message = ps_info.message.trim_end().to_owned();
        message.push_str(&format!(
            "\nReviewed-on: {}/{}\n",
            self.env.canonical_origin, change.number
        ));

        let commit = self.repo.create_commit(&NewCommit {
            tree_oid: merged_tree,
            parents: vec![tip],
            message,
            author: Persona::parse(&ps_info.author, self.env.service.when),
            committer: self.env.service.clone(),
        })?;
        Ok(Ok(Candidate::CherryPick(commit)))
    }

    /// The branch moved; record the merged state.
    fn finalize(
        &self,
        update: &ChangeUpdate,
        candidate: Candidate,
        pusher: AccountId,
    ) -> Result<SubmitOutcome, RejectReason> {
        let mut change = update.change.clone();
        let new_tip = candidate.tip();

        let merged_ps = if let Candidate::CherryPick(commit) = candidate {
            let id = PatchSetId {
                change: change.number,
                number: change.current_patch_set + 1,
            };
            let transition = self.repo.update_ref(&RefEdit {
                name: model::patch_set_ref(id),
                new_oid: commit,
                expected_old_oid: GitOid::ZERO,
            })?;
            if !transition.is_applied() {
                return Err(RejectReason::LockFailure {
                    name: model::patch_set_ref(id).as_str().to_owned(),
                });
            }
            self.store.add_patch_set(PatchSet {
                id,
                commit,
                uploader: pusher,
                description: None,
            });
            if self.env.copy_votes_on_cherry_pick {
                for vote in self.store.approvals(update.patch_set.id) {
                    self.store.add_approval(Approval {
                        patch_set: id,
                        ..vote
                    });
                }
            }
            change.current_patch_set = id.number;
            id
        } else {
            update.patch_set.id
        };

        if change.status.can_transition(ChangeStatus::Merged) {
            change.status = ChangeStatus::Merged;
        }
        self.store.put_change(change.clone());
        self.store.add_approval(Approval {
            patch_set: merged_ps,
            label: model::SUBMIT_LABEL.to_owned(),
            account: pusher,
            value: 1,
        });
        tracing::debug!(
            change = %change.number,
            tip = %new_tip,
            "change submitted"
        );
        Ok(SubmitOutcome::Merged {
            new_tip,
            patch_set: merged_ps,
        })
    }
}
