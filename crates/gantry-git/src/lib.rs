//! Git abstraction layer for gantry.
//!
//! This crate defines the [`GitRepo`] trait — the single interface through
//! which the review engine interacts with git. No engine crate should import
//! gix (or any other git library) directly; instead, they depend on
//! `gantry-git` and program against the trait.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`GitRepo`] trait definition.
//! - [`types`] — value types used in trait signatures ([`GitOid`], [`RefName`],
//!   [`TreeEntry`], [`RefTransition`], etc.).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.
//! - [`mem`] — [`MemRepo`], the deterministic in-memory implementation.

pub mod error;
pub mod mem;
pub mod repo;
pub mod types;

// gix-backed implementation modules
mod gix_repo;
mod objects_impl;
mod refs_impl;

pub use gix_repo::GixRepo;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use gantry_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use mem::MemRepo;
pub use repo::GitRepo;
pub use types::{
    CommitInfo, EntryMode, GitOid, NewCommit, OidParseError, Persona, RefEdit, RefName,
    RefNameError, RefTransition, TreeEdit, TreeEntry,
};
