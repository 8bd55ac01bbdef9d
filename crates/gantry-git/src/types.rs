//! Core types for the gantry git abstraction layer.
//!
//! These types form the vocabulary shared between the [`GitRepo`](crate::GitRepo)
//! trait and the engine crates. They intentionally contain no gix (or libgit2,
//! or CLI) types — the backend is an implementation detail.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (20 bytes).
///
/// Stored as raw bytes for efficient comparison, hashing, and Copy semantics.
/// Displays as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// The zero OID (`0000...0000`), used as a sentinel for "ref does not
    /// exist" on the old side of a push command and "delete" on the new side.
    pub const ZERO: Self = Self([0; 20]);

    /// Create a `GitOid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Return `true` if this is the zero OID.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_digit(chunk[0]).ok_or_else(|| OidParseError {
                value: s.to_owned(),
                reason: format!("invalid hex digit '{}'", chunk[0] as char),
            })?;
            let lo = hex_digit(chunk[1]).ok_or_else(|| OidParseError {
                value: s.to_owned(),
                reason: format!("invalid hex digit '{}'", chunk[1] as char),
            })?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        // Accept uppercase for leniency during parsing
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RefName
// ---------------------------------------------------------------------------

/// A validated git ref name.
///
/// Must start with `refs/` or be `HEAD`. Server-side ref namespaces
/// (`refs/heads/`, `refs/tags/`, `refs/changes/`, `refs/users/`) all satisfy
/// the same rule; no namespace knowledge lives here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Create a new `RefName`, validating that it looks like a git ref.
    ///
    /// # Errors
    /// Returns an error if the name is empty, or neither starts with `refs/`
    /// nor is `HEAD`.
    pub fn new(name: &str) -> Result<Self, RefNameError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// The symbolic `HEAD` name.
    #[must_use]
    pub fn head() -> Self {
        Self("HEAD".to_owned())
    }

    /// Return the ref name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), RefNameError> {
        if name.is_empty() {
            return Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must not be empty".to_owned(),
            });
        }
        if name.starts_with("refs/") || name == "HEAD" {
            Ok(())
        } else {
            Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must start with 'refs/' or be HEAD".to_owned(),
            })
        }
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RefName {
    type Err = RefNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Error from validating a [`RefName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefNameError {
    /// The invalid value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for RefNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ref name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for RefNameError {}

// ---------------------------------------------------------------------------
// Ref updates
// ---------------------------------------------------------------------------

/// A single compare-and-swap ref update.
///
/// `expected_old_oid` pins the value the ref must currently have:
/// [`GitOid::ZERO`] asserts the ref must not exist yet (create), and a zero
/// `new_oid` requests deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefEdit {
    /// The ref to update.
    pub name: RefName,
    /// The new OID to set the ref to (zero = delete).
    pub new_oid: GitOid,
    /// The expected current OID (zero = must not exist).
    pub expected_old_oid: GitOid,
}

/// The outcome of a compare-and-swap ref update.
///
/// Mirrors the transitions a receive pipeline reports per pushed ref. A CAS
/// mismatch is [`RefTransition::LockFailure`], not an error: racing writers
/// are an expected condition and callers decide whether to retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefTransition {
    /// The ref did not exist and was created.
    New,
    /// The ref advanced to a descendant of its old value.
    FastForward,
    /// The ref moved to a non-descendant (history rewrite).
    Forced,
    /// Old and new values were identical; nothing was written.
    NoChange,
    /// The ref existed and was deleted.
    Deleted,
    /// The backend refused the update for its own reasons.
    Rejected {
        /// Backend-supplied reason text.
        reason: String,
    },
    /// The expected old OID did not match the ref's current value.
    LockFailure,
}

impl RefTransition {
    /// `true` for the outcomes that left the ref in the requested state.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(
            self,
            Self::New | Self::FastForward | Self::Forced | Self::NoChange | Self::Deleted
        )
    }
}

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The file mode of a tree entry (analogous to `git ls-tree` mode column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`).
    Blob,
    /// Executable file (`100755`).
    BlobExecutable,
    /// Subdirectory (`040000`).
    Tree,
    /// Symbolic link (`120000`).
    Link,
    /// Gitlink / submodule pointer (`160000`).
    Commit,
}

/// A single entry in a git tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File or directory name (just the basename, not a full path).
    pub name: String,
    /// The entry mode.
    pub mode: EntryMode,
    /// The OID of the blob, tree, or commit this entry points to.
    pub oid: GitOid,
}

/// An edit operation on a tree.
///
/// Used with [`GitRepo::edit_tree`](crate::GitRepo::edit_tree) to build a new
/// tree from an existing one. Gitlink updates are an `Upsert` with
/// [`EntryMode::Commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEdit {
    /// Insert or update an entry. Missing intermediate trees are created.
    Upsert {
        /// Slash-separated path relative to tree root (e.g., `"lib/sub"`).
        path: String,
        /// File mode for the entry.
        mode: EntryMode,
        /// OID of the object to store at this path.
        oid: GitOid,
    },
    /// Remove an entry. No-op if the path does not exist.
    Remove {
        /// Slash-separated path relative to tree root.
        path: String,
    },
}

// ---------------------------------------------------------------------------
// Commit types
// ---------------------------------------------------------------------------

/// A name/email identity plus the time it acted, for commit authorship.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Persona {
    /// Human-readable name.
    pub name: String,
    /// Email address, without angle brackets.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub when: i64,
}

impl Persona {
    /// Build a `Persona` from an `"Name <email>"` identity string, as read
    /// back from [`CommitInfo`]. Falls back to using the whole string as the
    /// name when no `<...>` part is present.
    #[must_use]
    pub fn parse(ident: &str, when: i64) -> Self {
        if let Some(open) = ident.rfind('<') {
            let name = ident[..open].trim().to_owned();
            let email = ident[open + 1..].trim_end_matches('>').trim().to_owned();
            Self { name, email, when }
        } else {
            Self {
                name: ident.trim().to_owned(),
                email: String::new(),
                when,
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// The inputs for writing a new commit object.
///
/// Author and committer are explicit: merge and cherry-pick commits attribute
/// the original author while a service identity commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCommit {
    /// OID of the tree the commit snapshots.
    pub tree_oid: GitOid,
    /// Parent commit OIDs, in order (empty for root commits).
    pub parents: Vec<GitOid>,
    /// Full commit message, trailers included.
    pub message: String,
    /// The author identity.
    pub author: Persona,
    /// The committer identity.
    pub committer: Persona,
}

/// Information about a commit object.
///
/// Returned by [`GitRepo::read_commit`](crate::GitRepo::read_commit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// OID of the tree this commit points to.
    pub tree_oid: GitOid,
    /// OIDs of parent commits (empty for root commits).
    pub parents: Vec<GitOid>,
    /// The commit message.
    pub message: String,
    /// Author identity string (e.g., `"Alice <alice@example.com>"`).
    pub author: String,
    /// Committer identity string.
    pub committer: String,
}

impl CommitInfo {
    /// The first line of the commit message.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
