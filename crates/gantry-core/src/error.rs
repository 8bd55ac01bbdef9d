//! Why pushes fail, and the messages that explain it.
//!
//! Two severities exist. A [`RejectReason`] is fatal to one ref update: the
//! ref is reported rejected and nothing about it is recorded. An
//! [`IntakeMessage`] is advisory: the push succeeds and the message rides
//! along in the ref's result (an unresolvable reviewer never sinks a push).
//!
//! The `Display` strings here are part of the engine's interface: clients
//! and hooks grep for them, so they change only deliberately.

use thiserror::Error;

use gantry_git::GitError;

use crate::magic::ParseError;
use crate::model::ChangeNumber;

/// A fatal rejection of one pushed ref.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The magic ref's path matched no existing branch.
    #[error("branch {branch} not found")]
    BranchNotFound {
        /// The path as pushed, with no magic prefix.
        branch: String,
    },

    /// The pusher may not update this ref.
    #[error("prohibited by policy")]
    ProhibitedByPolicy,

    /// The pusher may not create draft changes.
    #[error("cannot upload drafts")]
    DraftsNotAllowed,

    /// The pusher may not submit to this branch.
    #[error("submit not allowed")]
    SubmitNotAllowed,

    /// `%submit` combined with a draft.
    #[error("cannot submit draft")]
    CannotSubmitDraft,

    /// Ordinary push that would rewind the branch, without the force flag
    /// and permission.
    #[error("non-fast forward")]
    NonFastForward,

    /// Ref deletion without force permission.
    #[error("cannot delete references")]
    CannotDeleteRefs,

    /// No `Change-Id:` line in the commit message footer.
    #[error("missing Change-Id in commit message footer")]
    MissingChangeId,

    /// More than one `Change-Id:` line in the commit message footer.
    #[error("multiple Change-Id lines in commit message footer")]
    MultipleChangeIds,

    /// A `Change-Id:` line whose value is malformed.
    #[error("invalid Change-Id line format in commit message footer")]
    InvalidChangeId,

    /// New patch set pushed to a merged or abandoned change.
    #[error("change {0} closed")]
    ChangeClosed(ChangeNumber),

    /// The pushed commit is already the change's current patch set.
    #[error("no new changes")]
    NoNewChanges,

    /// The submit strategy could not reconcile the change with the branch
    /// tip. Conflicting paths are listed one per line.
    #[error("change could not be merged due to a path conflict.{}", format_paths(.paths))]
    PathConflict {
        /// Conflicting paths, sorted.
        paths: Vec<String>,
    },

    /// Fast-forward-only projects refuse any submit that is not one.
    #[error("project policy requires all submissions to be a fast-forward")]
    FastForwardRequired,

    /// The ref moved underneath us and retrying did not help.
    #[error("failed to lock {name}")]
    LockFailure {
        /// The contended ref.
        name: String,
    },

    /// Malformed magic ref options.
    #[error(transparent)]
    BadOptions(#[from] ParseError),

    /// Repository-level failure unrelated to the push's content.
    #[error("internal server error: {message}")]
    Internal {
        /// Backend detail, for the log.
        message: String,
    },
}

impl From<GitError> for RejectReason {
    fn from(err: GitError) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

fn format_paths(paths: &[String]) -> String {
    let mut out = String::new();
    for path in paths {
        out.push_str("\n  ");
        out.push_str(path);
    }
    out
}

/// Advisory output of a successful intake.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IntakeMessage {
    /// `r=` or `cc=` address with no registered account.
    #[error("user \"{email}\" not found")]
    UserNotFound {
        /// The address as pushed.
        email: String,
    },

    /// `l=` vote on a label the project does not configure.
    #[error("label \"{label}\" is not a configured label")]
    LabelNotConfigured {
        /// The label as pushed.
        label: String,
    },

    /// `l=` vote outside the label's configured range.
    #[error("label \"{label}\": {value} is not a valid value")]
    LabelValueOutOfRange {
        /// The label as pushed.
        label: String,
        /// The out-of-range vote.
        value: i16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_strings_are_stable() {
        assert_eq!(
            RejectReason::BranchNotFound {
                branch: "noSuchBranch".to_owned()
            }
            .to_string(),
            "branch noSuchBranch not found"
        );
        assert_eq!(
            RejectReason::ChangeClosed(ChangeNumber(1245)).to_string(),
            "change 1245 closed"
        );
        assert_eq!(RejectReason::NoNewChanges.to_string(), "no new changes");
        assert_eq!(
            RejectReason::MissingChangeId.to_string(),
            "missing Change-Id in commit message footer"
        );
        assert_eq!(RejectReason::NonFastForward.to_string(), "non-fast forward");
    }

    #[test]
    fn path_conflict_lists_paths() {
        let r = RejectReason::PathConflict {
            paths: vec!["a.txt".to_owned(), "dir/b.txt".to_owned()],
        };
        assert_eq!(
            r.to_string(),
            "change could not be merged due to a path conflict.\n  a.txt\n  dir/b.txt"
        );
    }

    #[test]
    fn intake_message_strings_are_stable() {
        assert_eq!(
            IntakeMessage::UserNotFound {
                email: "ghost@example.com".to_owned()
            }
            .to_string(),
            "user \"ghost@example.com\" not found"
        );
        assert_eq!(
            IntakeMessage::LabelValueOutOfRange {
                label: "Code-Review".to_owned(),
                value: -3
            }
            .to_string(),
            "label \"Code-Review\": -3 is not a valid value"
        );
        assert_eq!(
            IntakeMessage::LabelNotConfigured {
                label: "Vrified".to_owned()
            }
            .to_string(),
            "label \"Vrified\" is not a configured label"
        );
    }
}
