//! The [`GitRepo`] trait — the single abstraction boundary between the review
//! engine and git.
//!
//! All engine crates interact with git exclusively through this trait. The
//! trait is object-safe so callers can use `dyn GitRepo` or `Box<dyn GitRepo>`.
//!
//! One implementor models one project's repository. The engine holds one
//! handle per project and performs every branch, change-ref, and gitlink
//! update through [`GitRepo::update_ref`] so that concurrent pushes are
//! serialized by compare-and-swap rather than by locks held across the
//! pipeline.

use crate::error::GitError;
use crate::types::{
    CommitInfo, GitOid, NewCommit, RefEdit, RefName, RefTransition, TreeEdit, TreeEntry,
};

/// The git abstraction trait used by the review engine.
///
/// Implementations may be backed by gix ([`GixRepo`](crate::GixRepo)) or by
/// the deterministic in-memory store ([`MemRepo`](crate::MemRepo)) used in
/// tests and embedded setups.
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return position
/// outside of `Result`. Callers may use `&dyn GitRepo` or `Box<dyn GitRepo>`.
pub trait GitRepo {
    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Resolve a ref to its OID, returning `None` if the ref does not exist.
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError>;

    /// Create or overwrite a ref unconditionally.
    ///
    /// For fixtures and repository bootstrap only — pipeline code must go
    /// through [`update_ref`](Self::update_ref) so racing writers are
    /// detected. `log_message` is written to the reflog entry where the
    /// backend keeps one.
    fn write_ref(&self, name: &RefName, oid: GitOid, log_message: &str) -> Result<(), GitError>;

    /// Apply a single compare-and-swap ref update.
    ///
    /// The ref must currently match `edit.expected_old_oid` (zero = must not
    /// exist); on mismatch the result is [`RefTransition::LockFailure`] and
    /// nothing is written. A zero `edit.new_oid` deletes the ref. Successful
    /// updates are classified as `New`, `FastForward`, `Forced`, `NoChange`,
    /// or `Deleted`.
    ///
    /// Losing a race is an `Ok` outcome, not an `Err`: callers own the retry
    /// policy.
    fn update_ref(&self, edit: &RefEdit) -> Result<RefTransition, GitError>;

    /// List refs matching a prefix (e.g., `"refs/heads/"`, `"refs/changes/"`).
    ///
    /// Returns `(ref_name, oid)` pairs sorted by ref name. The prefix is
    /// matched literally; an empty prefix lists every ref.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError>;

    /// The branch `HEAD` points at, or `None` when detached or unset.
    fn head_target(&self) -> Result<Option<RefName>, GitError>;

    // -----------------------------------------------------------------------
    // Object read
    // -----------------------------------------------------------------------

    /// Read the raw contents of a blob object.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Read the entries of a tree object (one level, not recursive).
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read a commit object's tree, parents, message, and identities.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    // -----------------------------------------------------------------------
    // Object write
    // -----------------------------------------------------------------------

    /// Write a blob object, returning its OID.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Write a tree object from entries, returning its OID.
    ///
    /// Entries may be given in any order; the backend stores them in git's
    /// canonical tree order.
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError>;

    /// Write a commit object, returning its OID.
    ///
    /// No ref is moved; pair with [`update_ref`](Self::update_ref). Author
    /// and committer are explicit because integration commits attribute the
    /// original author while the service identity commits.
    fn create_commit(&self, commit: &NewCommit) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Tree editing
    // -----------------------------------------------------------------------

    /// Build a new tree from `base` by applying `edits`, returning the new
    /// tree's OID. Missing intermediate directories are created; `base` is
    /// not modified.
    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Ancestry
    // -----------------------------------------------------------------------

    /// `true` if `ancestor` is reachable from `descendant` (or equal to it).
    fn is_ancestor(&self, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError>;

    /// A best common ancestor of `a` and `b`, or `None` for unrelated
    /// histories.
    fn merge_base(&self, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError>;
}
