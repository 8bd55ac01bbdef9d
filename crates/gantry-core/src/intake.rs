//! Turning a pushed commit into a change or a new patch set.
//!
//! Intake runs after the magic ref has been parsed. It owns the fatal
//! checks (branch, permissions, Change-Id discipline, change state), the
//! advisory resolution of reviewers and votes, and the creation of the
//! patch set ref. Nothing is recorded until every fatal check has passed:
//! a rejected push leaves no trace.

use gantry_git::{GitOid, GitRepo, RefEdit, RefName};

use crate::account::Directory;
use crate::error::{IntakeMessage, RejectReason};
use crate::magic::PushIntent;
use crate::model::{
    self, AccountId, Approval, Change, ChangeStatus, NotifyMode, PatchSet, PatchSetId,
};
use crate::perm::PermissionBackend;
use crate::project::ProjectConfig;
use crate::store::ChangeStore;
use crate::trailer::{self, ChangeIdProblem};

/// The recorded result of one accepted review push.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeUpdate {
    /// The change after this push.
    pub change: Change,
    /// The patch set this push created.
    pub patch_set: PatchSet,
    /// Whether the change itself was created by this push.
    pub created: bool,
    /// Votes that passed validation and were recorded.
    pub applied_votes: Vec<Approval>,
    /// Advisory messages to relay with the ref result.
    pub messages: Vec<IntakeMessage>,
    /// Requested notification fan-out.
    pub notify: NotifyMode,
}

/// The intake operation over one project.
pub struct ChangeIntake<'a> {
    repo: &'a dyn GitRepo,
    store: &'a dyn ChangeStore,
    directory: &'a dyn Directory,
    perms: &'a dyn PermissionBackend,
    project: &'a ProjectConfig,
}

impl<'a> ChangeIntake<'a> {
    pub fn new(
        repo: &'a dyn GitRepo,
        store: &'a dyn ChangeStore,
        directory: &'a dyn Directory,
        perms: &'a dyn PermissionBackend,
        project: &'a ProjectConfig,
    ) -> Self {
        Self {
            repo,
            store,
            directory,
            perms,
            project,
        }
    }

    /// Apply one review push. Fatal problems reject the whole ref; advisory
    /// ones are collected into [`ChangeUpdate::messages`].
    pub fn intake(
        &self,
        intent: &PushIntent,
        commit: GitOid,
        pusher: AccountId,
    ) -> Result<ChangeUpdate, RejectReason> {
        let not_found = || RejectReason::BranchNotFound {
            branch: intent.branch.clone(),
        };
        let dest = RefName::new(&format!("refs/heads/{}", intent.branch))
            .map_err(|_| not_found())?;
        if !intent.branch_exists || self.repo.read_ref(&dest)?.is_none() {
            return Err(not_found());
        }
        if !self.perms.can_push(pusher, &dest, false) {
            return Err(RejectReason::ProhibitedByPolicy);
        }
        if intent.draft && !self.perms.can_upload_drafts(pusher) {
            return Err(RejectReason::DraftsNotAllowed);
        }

        let info = self.repo.read_commit(commit)?;
        let change_id = trailer::change_id_of(&info.message).map_err(|p| match p {
            ChangeIdProblem::Missing => RejectReason::MissingChangeId,
            ChangeIdProblem::Multiple => RejectReason::MultipleChangeIds,
            ChangeIdProblem::Invalid => RejectReason::InvalidChangeId,
        })?;

        let existing = self.store.by_change_id(&self.project.name, &dest, &change_id);
        let (mut change, created) = match existing {
            Some(change) if !change.status.is_open() => {
                return Err(RejectReason::ChangeClosed(change.number));
            }
            Some(change) => {
                if self
                    .store
                    .patch_sets(change.number)
                    .iter()
                    .any(|ps| ps.commit == commit)
                {
                    return Err(RejectReason::NoNewChanges);
                }
                (change, false)
            }
            None => {
                let change = Change {
                    id: change_id,
                    number: self.store.next_change_number(),
                    project: self.project.name.clone(),
                    dest: dest.clone(),
                    status: if intent.draft {
                        ChangeStatus::Draft
                    } else {
                        ChangeStatus::New
                    },
                    topic: None,
                    owner: pusher,
                    current_patch_set: 0,
                    private: false,
                    reviewers: Default::default(),
                    ccs: Default::default(),
                };
                (change, true)
            }
        };

        if intent.topic.is_some() {
            change.topic.clone_from(&intent.topic);
        }
        if intent.private {
            change.private = true;
        }

        let mut messages = Vec::new();
        for email in &intent.reviewers {
            match self.directory.resolve_email(email) {
                Some(id) if id != change.owner => {
                    change.reviewers.insert(id);
                }
                Some(_) => {}
                None => messages.push(IntakeMessage::UserNotFound {
                    email: email.clone(),
                }),
            }
        }
        for email in &intent.ccs {
            match self.directory.resolve_email(email) {
                Some(id) if id != change.owner && !change.reviewers.contains(&id) => {
                    change.ccs.insert(id);
                }
                Some(_) => {}
                None => messages.push(IntakeMessage::UserNotFound {
                    email: email.clone(),
                }),
            }
        }

        let patch_set_id = PatchSetId {
            change: change.number,
            number: change.current_patch_set + 1,
        };
        let mut applied_votes = Vec::new();
        for (label, value) in &intent.votes {
            match self.project.label(label) {
                None => messages.push(IntakeMessage::LabelNotConfigured {
                    label: label.clone(),
                }),
                Some(lt) if !lt.valid_value(*value) => {
                    messages.push(IntakeMessage::LabelValueOutOfRange {
                        label: lt.name.clone(),
                        value: *value,
                    });
                }
                Some(lt) => applied_votes.push(Approval {
                    patch_set: patch_set_id,
                    label: lt.name.clone(),
                    account: pusher,
                    value: *value,
                }),
            }
        }

        // All fatal checks passed; publish the patch set ref first, then the
        // review records. A lost race on the ref leaves the store untouched.
        let ps_ref = model::patch_set_ref(patch_set_id);
        let transition = self.repo.update_ref(&RefEdit {
            name: ps_ref.clone(),
            new_oid: commit,
            expected_old_oid: GitOid::ZERO,
        })?;
        if !transition.is_applied() {
            return Err(RejectReason::LockFailure {
                name: ps_ref.as_str().to_owned(),
            });
        }

        change.current_patch_set = patch_set_id.number;
        let patch_set = PatchSet {
            id: patch_set_id,
            commit,
            uploader: pusher,
            description: intent.message.clone(),
        };
        self.store.put_change(change.clone());
        self.store.add_patch_set(patch_set.clone());
        for vote in &applied_votes {
            self.store.add_approval(vote.clone());
        }
        tracing::debug!(
            change = %change.number,
            patch_set = patch_set_id.number,
            created,
            "patch set accepted"
        );

        Ok(ChangeUpdate {
            change,
            patch_set,
            created,
            applied_votes,
            messages,
            notify: intent.notify,
        })
    }
}
