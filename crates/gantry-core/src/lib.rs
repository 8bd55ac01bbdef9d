//! Review engine core for gantry.
//!
//! Everything between "a pack arrived over `receive-pack`" and "refs moved,
//! review state recorded" lives here, expressed over the [`gantry_git`]
//! traits so the same logic runs against gix-backed repositories and the
//! in-memory test backend alike.
//!
//! # Crate layout
//!
//! - [`model`] — changes, patch sets, approvals, and the review ref
//!   namespace under `refs/changes/`.
//! - [`magic`] — parsing of `refs/for/<branch>%opts` push refs.
//! - [`trailer`] — `Change-Id` footer extraction.
//! - [`intake`] — turning a pushed commit into a change or patch set.
//! - [`submit`] — submit-on-push: fast-forward, merge, or cherry-pick onto
//!   the destination branch.
//! - [`visibility`] — ref advertisement filtering per viewer.
//! - [`submodule`] — superproject subscriptions and gitlink propagation.
//! - [`project`], [`perm`], [`account`], [`store`] — per-project
//!   configuration, permissions, account lookup, and change persistence.
//! - [`error`] — [`RejectReason`] and advisory [`IntakeMessage`]s.

pub mod account;
pub mod error;
pub mod intake;
pub mod magic;
pub mod model;
pub mod perm;
pub mod project;
pub mod store;
pub mod submit;
pub mod submodule;
pub mod trailer;
pub mod visibility;

mod merge;

// Re-export the working set at the crate root so callers can write
// `use gantry_core::{ChangeIntake, RejectReason, ...};`
pub use account::{Directory, MemDirectory};
pub use error::{IntakeMessage, RejectReason};
pub use intake::{ChangeIntake, ChangeUpdate};
pub use magic::{ParseError, PushIntent, is_magic, parse_magic_ref};
pub use model::{
    AccountId, Approval, Change, ChangeId, ChangeNumber, ChangeStatus, NotifyMode, PatchSet,
    PatchSetId, ReviewRef, SUBMIT_LABEL, parse_review_ref, patch_set_ref,
};
pub use perm::{Access, PermissionBackend, RuleSet};
pub use project::{LabelType, ProjectConfig, SubmitType};
pub use store::{ChangeStore, MemChangeStore};
pub use submit::{SubmitEnv, SubmitOnPush, SubmitOutcome};
pub use submodule::{
    AppliedGitlink, MemProjects, Projects, SuperprojectUpdater, Verbosity, parse_gitmodules,
    resolve_project,
};
pub use trailer::{ChangeIdProblem, change_id_of};
pub use visibility::RefVisibility;
