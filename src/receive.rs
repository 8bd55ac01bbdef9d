//! The receive pipeline.
//!
//! One push delivers a batch of ref commands. Each command is classified —
//! magic review ref, review-namespace write, or ordinary ref update — and
//! resolved to exactly one [`RefStatus`]: the ref moved (possibly with
//! advisory messages) or it was rejected with a reason the client can grep.
//! After the batch, branch updates fan out to subscribed superprojects.
//!
//! Fatal checks all run before any ref is written, so a rejected command
//! leaves no partial state. Submit is layered on top of intake: a failed
//! submit downgrades to an advisory message on an otherwise successful push.

use std::collections::{BTreeMap, BTreeSet};

use gantry_core::{
    AccountId, ChangeIntake, ChangeStore, Directory, PermissionBackend, ProjectConfig, Projects,
    RefVisibility, RejectReason, SubmitEnv, SubmitOnPush, SubmitOutcome, SuperprojectUpdater,
    is_magic, parse_magic_ref,
};
use gantry_git::{GitError, GitOid, GitRepo, RefEdit, RefName};

use crate::config::EngineConfig;

/// One ref update requested by a push, as received over the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefCommand {
    /// Destination ref exactly as the client named it (possibly magic).
    pub name: String,
    /// The tip the client believes the ref is at; zero for create.
    pub old: GitOid,
    /// The requested new tip; zero for delete.
    pub new: GitOid,
    /// The client asked for a forced update.
    pub force: bool,
}

impl RefCommand {
    /// A create command (expected old is zero).
    #[must_use]
    pub fn create(name: &str, new: GitOid) -> Self {
        Self {
            name: name.to_owned(),
            old: GitOid::ZERO,
            new,
            force: false,
        }
    }

    /// An update from `old` to `new`.
    #[must_use]
    pub fn update(name: &str, old: GitOid, new: GitOid) -> Self {
        Self {
            name: name.to_owned(),
            old,
            new,
            force: false,
        }
    }

    /// A delete of the ref currently at `old`.
    #[must_use]
    pub fn delete(name: &str, old: GitOid) -> Self {
        Self {
            name: name.to_owned(),
            old,
            new: GitOid::ZERO,
            force: false,
        }
    }

    /// Mark the command as forced.
    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Terminal status for one ref command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefStatus {
    /// The ref moved. Non-fatal per-item errors ride along as messages.
    Ok {
        /// Advisory messages (unresolved reviewers, rejected votes, failed
        /// submit), rendered for the client.
        messages: Vec<String>,
    },
    /// The ref did not move.
    Rejected {
        /// Why, in a grep-stable form.
        reason: RejectReason,
    },
}

impl RefStatus {
    /// Whether the ref moved.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// The status a push reports for one of its commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResult {
    /// The destination ref the command named.
    pub ref_name: String,
    /// What happened to it.
    pub status: RefStatus,
}

/// The review engine for one node: every collaborator a push needs, shared
/// across pushes and projects.
pub struct Engine<'a> {
    projects: &'a dyn Projects,
    store: &'a dyn ChangeStore,
    directory: &'a dyn Directory,
    perms: &'a dyn PermissionBackend,
    configs: &'a BTreeMap<String, ProjectConfig>,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(
        projects: &'a dyn Projects,
        store: &'a dyn ChangeStore,
        directory: &'a dyn Directory,
        perms: &'a dyn PermissionBackend,
        configs: &'a BTreeMap<String, ProjectConfig>,
        config: EngineConfig,
    ) -> Self {
        Self {
            projects,
            store,
            directory,
            perms,
            configs,
            config,
        }
    }

    /// The ref advertisement `viewer` sees for `project`.
    ///
    /// # Errors
    /// Fails if the project is not served or the repository cannot be read.
    pub fn advertise(
        &self,
        project: &str,
        viewer: AccountId,
    ) -> Result<Vec<(RefName, GitOid)>, GitError> {
        let repo = self.repo(project)?;
        RefVisibility::new(repo, self.store, self.perms, self.config.review.meta_refs)
            .advertisement(viewer)
    }

    /// Process one push against `project` on behalf of `pusher`.
    ///
    /// Every command gets exactly one terminal status. `when` (unix seconds)
    /// stamps any commits the engine itself creates. Branch updates that
    /// landed — ordinary pushes and submits alike — are propagated to
    /// subscribed superprojects after the whole batch has been resolved;
    /// propagation failures never affect the returned statuses.
    pub fn receive(
        &self,
        project: &str,
        pusher: AccountId,
        commands: &[RefCommand],
        when: i64,
    ) -> Vec<CommandResult> {
        tracing::debug!(project, commands = commands.len(), "receive");
        let repo = match self.repo(project) {
            Ok(repo) => repo,
            Err(error) => {
                let reason = RejectReason::from(error);
                return commands
                    .iter()
                    .map(|cmd| CommandResult {
                        ref_name: cmd.name.clone(),
                        status: RefStatus::Rejected {
                            reason: reason.clone(),
                        },
                    })
                    .collect();
            }
        };
        let fallback;
        let policy = match self.configs.get(project) {
            Some(policy) => policy,
            None => {
                fallback = ProjectConfig::new(project);
                &fallback
            }
        };

        let mut results = Vec::with_capacity(commands.len());
        let mut moved: Vec<(RefName, GitOid)> = Vec::new();
        for cmd in commands {
            let status = match self.apply(repo, policy, pusher, cmd, when, &mut moved) {
                Ok(status) => status,
                Err(reason) => RefStatus::Rejected { reason },
            };
            results.push(CommandResult {
                ref_name: cmd.name.clone(),
                status,
            });
        }

        if !moved.is_empty() {
            let updater = SuperprojectUpdater::new(
                self.projects,
                self.config.canonical_origin(),
                self.config.service_persona(when),
                self.config.submodules.update_verbosity,
                self.config.submodules.max_update_subjects,
            );
            for (branch, tip) in moved {
                updater.on_branch_updated(project, &branch, tip);
            }
        }
        results
    }

    fn repo(&self, project: &str) -> Result<&'a dyn GitRepo, GitError> {
        self.projects.get(project).ok_or_else(|| GitError::NotFound {
            message: format!("project {project} not served"),
        })
    }

    fn apply(
        &self,
        repo: &dyn GitRepo,
        policy: &ProjectConfig,
        pusher: AccountId,
        cmd: &RefCommand,
        when: i64,
        moved: &mut Vec<(RefName, GitOid)>,
    ) -> Result<RefStatus, RejectReason> {
        if is_magic(&cmd.name) {
            return self.magic_push(repo, policy, pusher, cmd, when, moved);
        }
        // The review namespace is written by the engine only.
        if cmd.name.starts_with("refs/changes/") {
            return Err(RejectReason::ProhibitedByPolicy);
        }
        let name = RefName::new(&cmd.name).map_err(|e| RejectReason::Internal {
            message: e.to_string(),
        })?;
        self.ordinary_push(repo, pusher, cmd, &name, moved)
    }

    /// Parse the magic ref, run intake, and layer submit on top when asked.
    fn magic_push(
        &self,
        repo: &dyn GitRepo,
        policy: &ProjectConfig,
        pusher: AccountId,
        cmd: &RefCommand,
        when: i64,
        moved: &mut Vec<(RefName, GitOid)>,
    ) -> Result<RefStatus, RejectReason> {
        if cmd.new.is_zero() {
            return Err(RejectReason::CannotDeleteRefs);
        }
        let branches = branch_names(repo)?;
        let intent = parse_magic_ref(&cmd.name, &branches)?;
        let intake = ChangeIntake::new(repo, self.store, self.directory, self.perms, policy);
        let update = intake.intake(&intent, cmd.new, pusher)?;
        let mut messages: Vec<String> =
            update.messages.iter().map(ToString::to_string).collect();

        if intent.submit {
            let env = SubmitEnv {
                service: self.config.service_persona(when),
                canonical_origin: self.config.canonical_origin().to_owned(),
                copy_votes_on_cherry_pick: self.config.submit.copy_votes_on_cherry_pick,
            };
            let submit = SubmitOnPush::new(repo, self.store, self.perms, policy, &env);
            match submit.submit(&update, pusher) {
                Ok(SubmitOutcome::Merged { new_tip, .. }) => {
                    moved.push((update.change.dest.clone(), new_tip));
                }
                // The patch set exists either way; the submit failure rides
                // along as a message.
                Ok(SubmitOutcome::Conflict(reason) | SubmitOutcome::NotAllowed(reason)) => {
                    messages.push(reason.to_string());
                }
                Err(error) => {
                    tracing::warn!(%error, change = update.change.number.0, "submit failed");
                    messages.push(error.to_string());
                }
            }
        }
        Ok(RefStatus::Ok { messages })
    }

    /// Apply the create/fast-forward/force/delete rules to a literal ref.
    fn ordinary_push(
        &self,
        repo: &dyn GitRepo,
        pusher: AccountId,
        cmd: &RefCommand,
        name: &RefName,
        moved: &mut Vec<(RefName, GitOid)>,
    ) -> Result<RefStatus, RejectReason> {
        let current = repo.read_ref(name)?.unwrap_or(GitOid::ZERO);
        if current != cmd.old {
            // The client's view is stale; a concurrent push won.
            return Err(RejectReason::LockFailure {
                name: name.as_str().to_owned(),
            });
        }
        if cmd.new.is_zero() {
            if cmd.old.is_zero() || !self.perms.can_push(pusher, name, true) {
                return Err(RejectReason::CannotDeleteRefs);
            }
        } else if current.is_zero() {
            if !self.perms.can_push(pusher, name, false) {
                return Err(RejectReason::ProhibitedByPolicy);
            }
        } else if repo.is_ancestor(current, cmd.new)? {
            if !self.perms.can_push(pusher, name, false) {
                return Err(RejectReason::ProhibitedByPolicy);
            }
        } else if !(cmd.force && self.perms.can_push(pusher, name, true)) {
            return Err(RejectReason::NonFastForward);
        }

        let transition = repo.update_ref(&RefEdit {
            name: name.clone(),
            new_oid: cmd.new,
            expected_old_oid: cmd.old,
        })?;
        if !transition.is_applied() {
            return Err(RejectReason::LockFailure {
                name: name.as_str().to_owned(),
            });
        }
        if !cmd.new.is_zero() && name.as_str().starts_with("refs/heads/") {
            moved.push((name.clone(), cmd.new));
        }
        Ok(RefStatus::Ok {
            messages: Vec::new(),
        })
    }
}

/// Short names of the branches that currently exist.
fn branch_names(repo: &dyn GitRepo) -> Result<BTreeSet<String>, GitError> {
    Ok(repo
        .list_refs("refs/heads/")?
        .into_iter()
        .map(|(name, _)| {
            name.as_str()
                .trim_start_matches("refs/heads/")
                .to_owned()
        })
        .collect())
}
