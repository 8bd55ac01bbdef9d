//! gantry — a git-native code-review intake engine.
//!
//! A push to a magic ref (`refs/for/<branch>`) becomes a review change with
//! numbered, immutable patch sets instead of a branch update. This crate ties
//! the review core to server configuration: [`Engine`] drives the receive
//! pipeline for a set of served projects, and [`EngineConfig`] is the node's
//! TOML configuration.
//!
//! The review semantics live in `gantry-core` (re-exported here); git object
//! and ref access is behind the `GitRepo` trait in `gantry-git`.

pub mod config;
pub mod receive;

pub use config::{ConfigError, EngineConfig};
pub use receive::{CommandResult, Engine, RefCommand, RefStatus};

pub use gantry_core::{
    Access, AccountId, AppliedGitlink, Change, ChangeId, ChangeNumber, ChangeStatus, ChangeStore,
    Directory, IntakeMessage, MemChangeStore, MemDirectory, MemProjects, NotifyMode, PatchSet,
    PatchSetId, PermissionBackend, ProjectConfig, Projects, RejectReason, RuleSet, SubmitType,
    Verbosity,
};
pub use gantry_git::{GitOid, GitRepo, GixRepo, MemRepo, Persona, RefName};
