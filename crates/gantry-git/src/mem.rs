//! A deterministic in-memory [`GitRepo`] implementation.
//!
//! `MemRepo` backs the engine's test suites and embedded setups that need a
//! hermetic repository: object ids are derived from content (SHA-256,
//! truncated to 20 bytes), so identical histories produce identical ids on
//! every run. Ref updates take a single writer lock, which makes
//! [`GitRepo::update_ref`] genuinely atomic — the compare and the swap cannot
//! interleave with another writer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use sha2::{Digest, Sha256};

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::*;

/// One stored object. Trees are kept in canonical order.
#[derive(Clone, Debug)]
enum MemObject {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit(CommitInfo),
}

#[derive(Default)]
struct Inner {
    objects: HashMap<GitOid, MemObject>,
    refs: BTreeMap<String, GitOid>,
    head: Option<String>,
}

/// An in-memory [`GitRepo`] modeling one project's repository.
pub struct MemRepo {
    inner: RwLock<Inner>,
}

impl Default for MemRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemRepo {
    /// Create an empty repository with `HEAD` pointing at
    /// `refs/heads/master` (unborn until the branch is written).
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                objects: HashMap::new(),
                refs: BTreeMap::new(),
                head: Some("refs/heads/master".to_owned()),
            }),
        }
    }

    /// Point `HEAD` at a branch.
    pub fn set_head(&self, target: &RefName) -> Result<(), GitError> {
        self.write_lock()?.head = Some(target.as_str().to_owned());
        Ok(())
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Inner>, GitError> {
        self.inner.read().map_err(|_| GitError::BackendError {
            message: "repository lock poisoned".to_owned(),
        })
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Inner>, GitError> {
        self.inner.write().map_err(|_| GitError::BackendError {
            message: "repository lock poisoned".to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Object hashing
//
// Objects are framed like git's loose format ("<kind> <len>\0<body>") but
// hashed with SHA-256 and truncated, so ids stay 20 bytes without claiming
// to be real SHA-1s.
// ---------------------------------------------------------------------------

fn hash_object(kind: &str, body: &[u8]) -> GitOid {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(body.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[..20]);
    GitOid::from_bytes(bytes)
}

fn mode_octal(mode: EntryMode) -> &'static str {
    match mode {
        EntryMode::Blob => "100644",
        EntryMode::BlobExecutable => "100755",
        EntryMode::Tree => "40000",
        EntryMode::Link => "120000",
        EntryMode::Commit => "160000",
    }
}

fn canonical_sort_key(e: &TreeEntry) -> Vec<u8> {
    let mut key = e.name.clone().into_bytes();
    if e.mode == EntryMode::Tree {
        key.push(b'/');
    }
    key
}

fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut body = Vec::new();
    for e in entries {
        body.extend_from_slice(mode_octal(e.mode).as_bytes());
        body.push(b' ');
        body.extend_from_slice(e.name.as_bytes());
        body.push(0);
        body.extend_from_slice(e.oid.as_bytes());
    }
    body
}

fn encode_commit(commit: &NewCommit) -> Vec<u8> {
    let mut body = String::new();
    body.push_str(&format!("tree {}\n", commit.tree_oid));
    for p in &commit.parents {
        body.push_str(&format!("parent {p}\n"));
    }
    body.push_str(&format!(
        "author {} {} +0000\n",
        commit.author, commit.author.when
    ));
    body.push_str(&format!(
        "committer {} {} +0000\n",
        commit.committer, commit.committer.when
    ));
    body.push('\n');
    body.push_str(&commit.message);
    body.into_bytes()
}

// ---------------------------------------------------------------------------
// Locked-state helpers (shared by trait methods that already hold the lock)
// ---------------------------------------------------------------------------

fn tree_entries(inner: &Inner, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
    match inner.objects.get(&oid) {
        Some(MemObject::Tree(entries)) => Ok(entries.clone()),
        Some(_) => Err(GitError::BackendError {
            message: format!("object {oid} is not a tree"),
        }),
        None => Err(GitError::NotFound {
            message: format!("tree {oid}: no such object"),
        }),
    }
}

fn store_tree(inner: &mut Inner, mut entries: Vec<TreeEntry>) -> Result<GitOid, GitError> {
    for e in &entries {
        if e.name.is_empty() || e.name.contains('/') {
            return Err(GitError::BackendError {
                message: format!("invalid tree entry name {:?}", e.name),
            });
        }
    }
    entries.sort_by(|a, b| canonical_sort_key(a).cmp(&canonical_sort_key(b)));
    for pair in entries.windows(2) {
        if pair[0].name == pair[1].name {
            return Err(GitError::BackendError {
                message: format!("duplicate tree entry name {:?}", pair[0].name),
            });
        }
    }
    let oid = hash_object("tree", &encode_tree(&entries));
    inner.objects.entry(oid).or_insert(MemObject::Tree(entries));
    Ok(oid)
}

fn is_ancestor_in(inner: &Inner, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut seen = HashSet::new();
    let mut stack = vec![descendant];
    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }
        let Some(MemObject::Commit(info)) = inner.objects.get(&oid) else {
            continue;
        };
        for parent in &info.parents {
            if *parent == ancestor {
                return Ok(true);
            }
            stack.push(*parent);
        }
    }
    Ok(false)
}

/// Apply one edit at `tree_oid`, returning the oid of the rewritten tree.
/// Empty subtrees left behind by removals are pruned from their parent.
fn apply_tree_edit(
    inner: &mut Inner,
    tree_oid: GitOid,
    components: &[&str],
    edit: &TreeEdit,
) -> Result<GitOid, GitError> {
    let mut entries = tree_entries(inner, tree_oid)?;
    let (head, rest) = components
        .split_first()
        .ok_or_else(|| GitError::BackendError {
            message: "empty path in tree edit".to_owned(),
        })?;

    if rest.is_empty() {
        match edit {
            TreeEdit::Upsert { mode, oid, .. } => {
                entries.retain(|e| e.name != *head);
                entries.push(TreeEntry {
                    name: (*head).to_owned(),
                    mode: *mode,
                    oid: *oid,
                });
            }
            TreeEdit::Remove { .. } => {
                entries.retain(|e| e.name != *head);
            }
        }
        return store_tree(inner, entries);
    }

    let child_base = match entries.iter().find(|e| e.name == *head) {
        Some(e) if e.mode == EntryMode::Tree => e.oid,
        // A non-tree entry in the way of a deeper path is clobbered on
        // upsert; removals of paths under it are no-ops.
        _ => match edit {
            TreeEdit::Upsert { .. } => store_tree(inner, Vec::new())?,
            TreeEdit::Remove { .. } => return store_tree(inner, entries),
        },
    };

    let new_child = apply_tree_edit(inner, child_base, rest, edit)?;
    entries.retain(|e| e.name != *head);
    let child_is_empty = matches!(
        inner.objects.get(&new_child),
        Some(MemObject::Tree(list)) if list.is_empty()
    );
    if !child_is_empty {
        entries.push(TreeEntry {
            name: (*head).to_owned(),
            mode: EntryMode::Tree,
            oid: new_child,
        });
    }
    store_tree(inner, entries)
}

impl GitRepo for MemRepo {
    // === Refs ===

    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError> {
        let inner = self.read_lock()?;
        if name.as_str() == "HEAD" {
            let Some(target) = inner.head.clone() else {
                return Ok(None);
            };
            return Ok(inner.refs.get(&target).copied());
        }
        Ok(inner.refs.get(name.as_str()).copied())
    }

    fn write_ref(&self, name: &RefName, oid: GitOid, _log_message: &str) -> Result<(), GitError> {
        if name.as_str() == "HEAD" {
            return Err(GitError::BackendError {
                message: "HEAD is symbolic; use MemRepo::set_head".to_owned(),
            });
        }
        self.write_lock()?.refs.insert(name.as_str().to_owned(), oid);
        Ok(())
    }

    fn update_ref(&self, edit: &RefEdit) -> Result<RefTransition, GitError> {
        let mut inner = self.write_lock()?;
        let current = inner.refs.get(edit.name.as_str()).copied();

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
            if current.is_none() {
                return Ok(RefTransition::NoChange);
            }
            inner.refs.remove(edit.name.as_str());
            return Ok(RefTransition::Deleted);
        }

        if !inner.objects.contains_key(&edit.new_oid) {
            return Err(GitError::NotFound {
                message: format!("ref target {}: no such object", edit.new_oid),
            });
        }

        let transition = match current {
            None => RefTransition::New,
            Some(cur) if cur == edit.new_oid => return Ok(RefTransition::NoChange),
            Some(cur) => {
                if is_ancestor_in(&inner, cur, edit.new_oid)? {
                    RefTransition::FastForward
                } else {
                    RefTransition::Forced
                }
            }
        };

        inner.refs.insert(edit.name.as_str().to_owned(), edit.new_oid);
        Ok(transition)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
        let inner = self.read_lock()?;
        let mut result = Vec::new();
        for (name, oid) in &inner.refs {
            if !name.starts_with(prefix) {
                continue;
            }
            if let Ok(ref_name) = RefName::new(name) {
                result.push((ref_name, *oid));
            }
        }
        Ok(result)
    }

    fn head_target(&self) -> Result<Option<RefName>, GitError> {
        let inner = self.read_lock()?;
        match &inner.head {
            Some(target) => Ok(RefName::new(target).ok()),
            None => Ok(None),
        }
    }

    // === Object read ===

    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        let inner = self.read_lock()?;
        match inner.objects.get(&oid) {
            Some(MemObject::Blob(data)) => Ok(data.clone()),
            Some(_) => Err(GitError::BackendError {
                message: format!("object {oid} is not a blob"),
            }),
            None => Err(GitError::NotFound {
                message: format!("blob {oid}: no such object"),
            }),
        }
    }

    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        let inner = self.read_lock()?;
        tree_entries(&inner, oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        let inner = self.read_lock()?;
        match inner.objects.get(&oid) {
            Some(MemObject::Commit(info)) => Ok(info.clone()),
            Some(_) => Err(GitError::BackendError {
                message: format!("object {oid} is not a commit"),
            }),
            None => Err(GitError::NotFound {
                message: format!("commit {oid}: no such object"),
            }),
        }
    }

    // === Object write ===

    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        let oid = hash_object("blob", data);
        self.write_lock()?
            .objects
            .entry(oid)
            .or_insert_with(|| MemObject::Blob(data.to_vec()));
        Ok(oid)
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
        let mut inner = self.write_lock()?;
        store_tree(&mut inner, entries.to_vec())
    }

    fn create_commit(&self, commit: &NewCommit) -> Result<GitOid, GitError> {
        let mut inner = self.write_lock()?;
        match inner.objects.get(&commit.tree_oid) {
            Some(MemObject::Tree(_)) => {}
            _ => {
                return Err(GitError::NotFound {
                    message: format!("commit tree {}: no such tree", commit.tree_oid),
                });
            }
        }
        for parent in &commit.parents {
            match inner.objects.get(parent) {
                Some(MemObject::Commit(_)) => {}
                _ => {
                    return Err(GitError::NotFound {
                        message: format!("commit parent {parent}: no such commit"),
                    });
                }
            }
        }
        let oid = hash_object("commit", &encode_commit(commit));
        let info = CommitInfo {
            tree_oid: commit.tree_oid,
            parents: commit.parents.clone(),
            message: commit.message.clone(),
            author: commit.author.to_string(),
            committer: commit.committer.to_string(),
        };
        inner.objects.entry(oid).or_insert(MemObject::Commit(info));
        Ok(oid)
    }

    // === Tree editing ===

    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError> {
        let mut inner = self.write_lock()?;
        let mut current = base;
        for edit in edits {
            let path = match edit {
                TreeEdit::Upsert { path, .. } | TreeEdit::Remove { path } => path,
            };
            let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
            if components.is_empty() {
                return Err(GitError::BackendError {
                    message: format!("invalid tree edit path {path:?}"),
                });
            }
            current = apply_tree_edit(&mut inner, current, &components, edit)?;
        }
        Ok(current)
    }

    // === Ancestry ===

    fn is_ancestor(&self, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
        let inner = self.read_lock()?;
        is_ancestor_in(&inner, ancestor, descendant)
    }

    fn merge_base(&self, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
        let inner = self.read_lock()?;

        let mut a_ancestors = HashSet::new();
        let mut stack = vec![a];
        while let Some(oid) = stack.pop() {
            if !a_ancestors.insert(oid) {
                continue;
            }
            if let Some(MemObject::Commit(info)) = inner.objects.get(&oid) {
                stack.extend(info.parents.iter().copied());
            }
        }

        // Breadth-first from b so the nearest common ancestor wins.
        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::from([b]);
        while let Some(oid) = queue.pop_front() {
            if !seen.insert(oid) {
                continue;
            }
            if a_ancestors.contains(&oid) {
                return Ok(Some(oid));
            }
            if let Some(MemObject::Commit(info)) = inner.objects.get(&oid) {
                queue.extend(info.parents.iter().copied());
            }
        }
        Ok(None)
    }
}
