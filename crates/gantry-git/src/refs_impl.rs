//! gix-backed ref and ancestry operations.

use gix::refs::transaction::{Change, LogChange, PreviousValue};
use gix::refs::{FullName, Target};

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::*;

/// Convert a `GitOid` to a `gix::ObjectId`.
fn to_gix_oid(oid: &GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

/// Convert a `gix::ObjectId` (or `&gix::oid`) to a `GitOid`.
fn from_gix_oid(oid: &gix::oid) -> GitOid {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(oid.as_bytes());
    GitOid::from_bytes(bytes)
}

pub fn read_ref(repo: &GixRepo, name: &RefName) -> Result<Option<GitOid>, GitError> {
    match repo.repo.try_find_reference(name.as_str()) {
        Ok(Some(mut r)) => {
            let id = r
                .peel_to_id_in_place()
                .map_err(|e| GitError::BackendError {
                    message: e.to_string(),
                })?;
            Ok(Some(from_gix_oid(id.as_ref())))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(GitError::BackendError {
            message: e.to_string(),
        }),
    }
}

pub fn write_ref(
    repo: &GixRepo,
    name: &RefName,
    oid: GitOid,
    log_message: &str,
) -> Result<(), GitError> {
    let gix_oid = to_gix_oid(&oid);
    repo.repo
        .reference(name.as_str(), gix_oid, PreviousValue::Any, log_message)
        .map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
    Ok(())
}

pub fn update_ref(repo: &GixRepo, edit: &RefEdit) -> Result<RefTransition, GitError> {
    let current = read_ref(repo, &edit.name)?;

    // Precheck against the expected old value. This also classifies the
    // transition; the transaction below re-asserts the expectation so a
    // writer racing in between still loses cleanly.
    match current {
        None => {
            if !edit.expected_old_oid.is_zero() {
                return Ok(RefTransition::LockFailure);
            }
        }
        Some(cur) => {
            if edit.expected_old_oid.is_zero() || cur != edit.expected_old_oid {
                return Ok(RefTransition::LockFailure);
            }
        }
    }

    if edit.new_oid.is_zero() {
        let Some(r) = repo
            .repo
            .try_find_reference(edit.name.as_str())
            .map_err(|e| GitError::BackendError {
                message: e.to_string(),
            })?
        else {
            return Ok(RefTransition::NoChange);
        };
        // Not atomic with the precheck in this backend; the loser of a race
        // here deletes a ref the winner just moved, which matches plain git's
        // update-ref -d behavior without --stdin transactions.
        r.delete().map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
        return Ok(RefTransition::Deleted);
    }

    if current == Some(edit.new_oid) {
        return Ok(RefTransition::NoChange);
    }

    let transition = match current {
        None => RefTransition::New,
        Some(cur) => {
            if is_ancestor(repo, cur, edit.new_oid)? {
                RefTransition::FastForward
            } else {
                RefTransition::Forced
            }
        }
    };

    let name: FullName = edit.name.as_str().try_into().map_err(
        |e: gix::validate::reference::name::Error| GitError::BackendError {
            message: e.to_string(),
        },
    )?;
    let expected = if edit.expected_old_oid.is_zero() {
        PreviousValue::MustNotExist
    } else {
        PreviousValue::MustExistAndMatch(Target::Object(to_gix_oid(&edit.expected_old_oid)))
    };
    let gix_edit = gix::refs::transaction::RefEdit {
        change: Change::Update {
            log: LogChange {
                mode: gix::refs::transaction::RefLog::AndReference,
                force_create_reflog: false,
                message: "gantry ref update".into(),
            },
            expected,
            new: Target::Object(to_gix_oid(&edit.new_oid)),
        },
        name,
        deref: false,
    };

    match repo.repo.edit_references([gix_edit]) {
        Ok(_) => Ok(transition),
        Err(e) => {
            let msg = e.to_string();
            // Detect CAS failures from the error message
            if msg.contains("existing object id")
                || msg.contains("MustExistAndMatch")
                || msg.contains("did not match")
                || msg.contains("mustNotExist")
                || msg.contains("MustNotExist")
            {
                tracing::debug!(ref_name = %edit.name, "ref update lost compare-and-swap race");
                Ok(RefTransition::LockFailure)
            } else {
                Err(GitError::RefConflict {
                    ref_name: edit.name.as_str().to_owned(),
                    message: msg,
                })
            }
        }
    }
}

pub fn list_refs(repo: &GixRepo, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
    let platform = repo.repo.references().map_err(|e| GitError::BackendError {
        message: e.to_string(),
    })?;
    let refs_iter = platform.prefixed(prefix).map_err(|e| GitError::BackendError {
        message: e.to_string(),
    })?;

    let mut result = Vec::new();
    for r in refs_iter {
        let mut r = r.map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
        let name_str = r.name().as_bstr().to_string();
        let id = r.peel_to_id_in_place().map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
        let oid = from_gix_oid(id.as_ref());
        if let Ok(ref_name) = RefName::new(&name_str) {
            result.push((ref_name, oid));
        }
    }
    result.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(result)
}

pub fn head_target(repo: &GixRepo) -> Result<Option<RefName>, GitError> {
    let head = repo
        .repo
        .try_find_reference("HEAD")
        .map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
    let Some(head) = head else {
        return Ok(None);
    };
    match &head.inner.target {
        Target::Symbolic(name) => Ok(RefName::new(&name.as_bstr().to_string()).ok()),
        Target::Object(_) => Ok(None),
    }
}

pub fn is_ancestor(repo: &GixRepo, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let ancestor_gix = to_gix_oid(&ancestor);
    let descendant_gix = to_gix_oid(&descendant);

    // Walk from descendant back through history, looking for ancestor
    let walk = repo
        .repo
        .rev_walk([descendant_gix])
        .all()
        .map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;

    for info in walk {
        let info = info.map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
        if info.id == ancestor_gix {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn merge_base(repo: &GixRepo, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
    let a_gix = to_gix_oid(&a);
    let b_gix = to_gix_oid(&b);

    match repo.repo.merge_base(a_gix, b_gix) {
        Ok(id) => Ok(Some(from_gix_oid(id.as_ref()))),
        Err(gix::repository::merge_base::Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(GitError::BackendError {
            message: e.to_string(),
        }),
    }
}
