//! The review data model: accounts, changes, patch sets, approvals, and the
//! ref namespace changes live under.
//!
//! Everything here is plain data. Mutation rules (who may move a change to
//! which status, when a patch set is added) live with the operations in
//! [`intake`](crate::intake) and [`submit`](crate::submit); the one rule the
//! model itself enforces is that status transitions are monotone.

use std::collections::BTreeSet;
use std::fmt;

use gantry_git::{GitOid, RefName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A registered account, by numeric id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change's server-assigned sequence number, used in ref names and URLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeNumber(pub u32);

impl fmt::Display for ChangeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stable review identity carried in the `Change-Id:` commit footer:
/// `I` followed by 40 lowercase hex digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeId(String);

impl ChangeId {
    /// Validate and wrap a raw footer value.
    pub fn new(value: &str) -> Result<Self, InvalidChangeId> {
        let rest = value.strip_prefix('I').ok_or_else(|| InvalidChangeId {
            value: value.to_owned(),
        })?;
        if rest.len() == 40 && rest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            Ok(Self(value.to_owned()))
        } else {
            Err(InvalidChangeId {
                value: value.to_owned(),
            })
        }
    }

    /// The raw `I<hex>` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value that does not look like `I` + 40 hex digits.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid Change-Id value {value:?}")]
pub struct InvalidChangeId {
    /// The offending value.
    pub value: String,
}

/// Identity of one patch set: the change it belongs to plus its 1-based
/// sequence number. Displays in the conventional `<change>,<ps>` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchSetId {
    /// The owning change.
    pub change: ChangeNumber,
    /// 1-based sequence number within the change.
    pub number: u32,
}

impl fmt::Display for PatchSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.change, self.number)
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// Lifecycle state of a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    /// Open and visible for review.
    New,
    /// Open but visible only to the owner, reviewers, and privileged viewers.
    Draft,
    /// Integrated into its destination branch. Terminal.
    Merged,
    /// Closed without integration.
    Abandoned,
}

impl ChangeStatus {
    /// `true` while the change can still accept patch sets.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Draft)
    }

    /// Whether moving from `self` to `to` is a legal monotone transition.
    /// A draft publishes to `New` before it can merge, nothing leaves
    /// `Merged`, and `Abandoned` can only be restored to `New`.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Draft | Self::New | Self::Abandoned)
                | (Self::New, Self::New | Self::Merged | Self::Abandoned)
                | (Self::Abandoned, Self::New)
        )
    }
}

/// One tracked review unit: a Change-Id bound to a project and destination
/// branch, accumulating patch sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    /// Stable identity from the commit footer.
    pub id: ChangeId,
    /// Server-assigned number, used in ref names.
    pub number: ChangeNumber,
    /// Project (repository) name.
    pub project: String,
    /// Destination branch, full ref (`refs/heads/...`).
    pub dest: RefName,
    /// Lifecycle state.
    pub status: ChangeStatus,
    /// Optional topic grouping related changes.
    pub topic: Option<String>,
    /// The uploader of patch set 1.
    pub owner: AccountId,
    /// Highest patch set number so far.
    pub current_patch_set: u32,
    /// Restrict visibility to owner and privileged viewers.
    pub private: bool,
    /// Accounts asked to review.
    pub reviewers: BTreeSet<AccountId>,
    /// Accounts copied on the change.
    pub ccs: BTreeSet<AccountId>,
}

impl Change {
    /// The destination branch's short name (`refs/heads/x` → `x`).
    #[must_use]
    pub fn dest_branch(&self) -> &str {
        self.dest
            .as_str()
            .strip_prefix("refs/heads/")
            .unwrap_or(self.dest.as_str())
    }

    /// Identity of the current patch set.
    #[must_use]
    pub const fn current_patch_set_id(&self) -> PatchSetId {
        PatchSetId {
            change: self.number,
            number: self.current_patch_set,
        }
    }
}

/// One immutable revision of a change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchSet {
    /// (change, sequence) identity.
    pub id: PatchSetId,
    /// The commit this patch set records.
    pub commit: GitOid,
    /// Who uploaded it.
    pub uploader: AccountId,
    /// Optional cover message supplied with the push.
    pub description: Option<String>,
}

/// One vote on one patch set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Approval {
    /// The patch set voted on.
    pub patch_set: PatchSetId,
    /// Label name, e.g. `Code-Review`.
    pub label: String,
    /// Who voted.
    pub account: AccountId,
    /// The vote value, within the label's configured range.
    pub value: i16,
}

/// The synthetic label recorded when a change is submitted.
pub const SUBMIT_LABEL: &str = "SUBM";

/// Who gets notified about a change update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyMode {
    /// Nobody.
    None,
    /// The change owner only.
    Owner,
    /// Owner plus reviewers.
    OwnerReviewers,
    /// Everyone watching.
    #[default]
    All,
}

impl NotifyMode {
    /// Parse the wire form used in push options (`NONE`, `OWNER`,
    /// `OWNER_REVIEWERS`, `ALL`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NONE" => Some(Self::None),
            "OWNER" => Some(Self::Owner),
            "OWNER_REVIEWERS" => Some(Self::OwnerReviewers),
            "ALL" => Some(Self::All),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// The review ref namespace
//
// Patch sets:  refs/changes/<NN>/<change>/<ps>
// Review meta: refs/changes/<NN>/<change>/meta
// Edits:       refs/users/<NN>/<account>/edit-<change>/<ps>
//
// <NN> is the number modulo 100, zero-padded, so refs shard evenly across
// directories.
// ---------------------------------------------------------------------------

fn shard(n: u32) -> String {
    format!("{:02}", n % 100)
}

fn make_ref(name: String) -> RefName {
    // All builders below emit refs/-prefixed names, which always validate.
    RefName::new(&name).expect("generated ref name is valid")
}

/// The ref a patch set's commit is published under.
#[must_use]
pub fn patch_set_ref(id: PatchSetId) -> RefName {
    make_ref(format!(
        "refs/changes/{}/{}/{}",
        shard(id.change.0),
        id.change,
        id.number
    ))
}

/// The review-history ref of a change.
#[must_use]
pub fn change_meta_ref(change: ChangeNumber) -> RefName {
    make_ref(format!("refs/changes/{}/{change}/meta", shard(change.0)))
}

/// The ref a user's in-progress edit of a patch set lives under.
#[must_use]
pub fn edit_ref(account: AccountId, id: PatchSetId) -> RefName {
    make_ref(format!(
        "refs/users/{}/{}/edit-{}/{}",
        shard(account.0),
        account,
        id.change,
        id.number
    ))
}

/// A parsed ref from the review namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewRef {
    /// `refs/changes/NN/<change>/<ps>`
    PatchSet(PatchSetId),
    /// `refs/changes/NN/<change>/meta`
    Meta(ChangeNumber),
    /// `refs/users/NN/<account>/edit-<change>/<ps>`
    Edit {
        /// The editing account.
        account: AccountId,
        /// The patch set being edited.
        patch_set: PatchSetId,
    },
}

/// Classify a ref name against the review namespace. Returns `None` for
/// ordinary refs (branches, tags) and for malformed review-namespace names.
#[must_use]
pub fn parse_review_ref(name: &RefName) -> Option<ReviewRef> {
    let s = name.as_str();
    if let Some(rest) = s.strip_prefix("refs/changes/") {
        let mut parts = rest.split('/');
        let nn = parts.next()?;
        let change: u32 = parts.next()?.parse().ok()?;
        let tail = parts.next()?;
        if parts.next().is_some() || nn.len() != 2 || shard(change) != nn {
            return None;
        }
        let number = ChangeNumber(change);
        if tail == "meta" {
            return Some(ReviewRef::Meta(number));
        }
        let ps: u32 = tail.parse().ok()?;
        return Some(ReviewRef::PatchSet(PatchSetId {
            change: number,
            number: ps,
        }));
    }
    if let Some(rest) = s.strip_prefix("refs/users/") {
        let mut parts = rest.split('/');
        let nn = parts.next()?;
        let account: u32 = parts.next()?.parse().ok()?;
        let edit = parts.next()?;
        let ps: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || nn.len() != 2 || shard(account) != nn {
            return None;
        }
        let change: u32 = edit.strip_prefix("edit-")?.parse().ok()?;
        return Some(ReviewRef::Edit {
            account: AccountId(account),
            patch_set: PatchSetId {
                change: ChangeNumber(change),
                number: ps,
            },
        });
    }
    None
}
