//! Entry-level three-way tree merging.
//!
//! Submit strategies reconcile a change with the branch tip by comparing
//! flattened trees entry by entry: a path changed on only one side takes
//! that side, a path changed the same way on both is already agreed, and a
//! path changed differently on both is a conflict. No content-level (textual)
//! merging happens here; a both-edited file is a conflict even when the
//! hunks would not overlap.

use std::collections::BTreeMap;

use gantry_git::{EntryMode, GitError, GitOid, GitRepo, TreeEdit};

/// A leaf entry in a flattened tree: blobs, symlinks, and gitlinks, keyed by
/// slash-joined path. Subtrees are descended into, not listed.
pub(crate) type FlatTree = BTreeMap<String, (EntryMode, GitOid)>;

/// Flatten a tree into leaf paths. `None` flattens to the empty tree.
pub(crate) fn flatten(repo: &dyn GitRepo, tree: Option<GitOid>) -> Result<FlatTree, GitError> {
    let mut out = FlatTree::new();
    if let Some(tree) = tree {
        walk(repo, tree, String::new(), &mut out)?;
    }
    Ok(out)
}

fn walk(
    repo: &dyn GitRepo,
    tree: GitOid,
    prefix: String,
    out: &mut FlatTree,
) -> Result<(), GitError> {
    for entry in repo.read_tree(tree)? {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if entry.mode == EntryMode::Tree {
            walk(repo, entry.oid, path, out)?;
        } else {
            out.insert(path, (entry.mode, entry.oid));
        }
    }
    Ok(())
}

/// The leaf entry at a slash-separated path, if present.
pub(crate) fn entry_at(
    repo: &dyn GitRepo,
    tree: GitOid,
    path: &str,
) -> Result<Option<(EntryMode, GitOid)>, GitError> {
    let mut current = tree;
    let mut parts = path.split('/').peekable();
    while let Some(part) = parts.next() {
        let entries = repo.read_tree(current)?;
        let Some(entry) = entries.iter().find(|e| e.name == part) else {
            return Ok(None);
        };
        if parts.peek().is_none() {
            return Ok(if entry.mode == EntryMode::Tree {
                None
            } else {
                Some((entry.mode, entry.oid))
            });
        }
        if entry.mode != EntryMode::Tree {
            return Ok(None);
        }
        current = entry.oid;
    }
    Ok(None)
}

/// Outcome of an entry-level three-way merge, expressed against `ours`.
pub(crate) enum Resolution {
    /// Mergeable; apply these edits to the `ours` tree. Empty means `ours`
    /// already is the merge result.
    Clean(Vec<TreeEdit>),
    /// Paths changed differently on both sides, sorted.
    Conflicts(Vec<String>),
}

/// Merge `theirs` into `ours` relative to `base`, entry by entry.
pub(crate) fn three_way(base: &FlatTree, ours: &FlatTree, theirs: &FlatTree) -> Resolution {
    let mut removes = Vec::new();
    let mut upserts = Vec::new();
    let mut conflicts = Vec::new();

    let mut paths: Vec<&String> = ours.keys().chain(theirs.keys()).chain(base.keys()).collect();
    paths.sort();
    paths.dedup();

    for path in paths {
        let b = base.get(path);
        let o = ours.get(path);
        let t = theirs.get(path);
        if o == t || t == b {
            continue;
        }
        if o == b {
            match t {
                Some((mode, oid)) => upserts.push(TreeEdit::Upsert {
                    path: path.clone(),
                    mode: *mode,
                    oid: *oid,
                }),
                None => removes.push(TreeEdit::Remove { path: path.clone() }),
            }
            continue;
        }
        conflicts.push(path.clone());
    }

    if conflicts.is_empty() {
        removes.extend(upserts);
        Resolution::Clean(removes)
    } else {
        Resolution::Conflicts(conflicts)
    }
}
