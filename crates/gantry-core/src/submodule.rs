//! Superproject subscriptions: keeping gitlinks in sync with subscribed
//! branches.
//!
//! A superproject subscribes to a submodule's branch through its
//! `.gitmodules` file: an entry whose `url` resolves to a project served
//! here and whose `branch` names the pushed branch (or `.` for "same branch
//! as mine"). After any branch update the engine rebuilds the subscription
//! graph from the current superproject tips and commits an updated gitlink
//! into every subscriber, recursing so nested superprojects follow.
//!
//! Propagation is strictly best-effort: a failure to update one subscriber
//! is logged and skipped, and never affects the push that triggered it.
//! Subscription cycles are suppressed the same way.

use std::collections::{BTreeMap, HashSet, VecDeque};

use gantry_git::{
    EntryMode, GitError, GitOid, GitRepo, NewCommit, Persona, RefEdit, RefName, TreeEdit,
};
use serde::{Deserialize, Serialize};

use crate::merge;

/// How much a gitlink-update commit message says about the new commits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    /// Header only.
    Off,
    /// One line naming the submodule path and branch.
    SubjectOnly,
    /// Path line plus the subjects of the newly contained commits.
    #[default]
    Full,
}

/// The projects served by this node, by name.
pub trait Projects: Send + Sync {
    /// The repository of `name`, if served here.
    fn get(&self, name: &str) -> Option<&dyn GitRepo>;
    /// All served project names.
    fn names(&self) -> Vec<String>;
}

/// In-memory project registry over [`gantry_git::MemRepo`], for tests and
/// single-node deployments.
#[derive(Default)]
pub struct MemProjects {
    repos: BTreeMap<String, gantry_git::MemRepo>,
}

impl MemProjects {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty project, returning a handle to it.
    pub fn create(&mut self, name: &str) -> &gantry_git::MemRepo {
        self.repos
            .entry(name.to_owned())
            .or_insert_with(gantry_git::MemRepo::new)
    }

    /// Borrow a project's repository.
    #[must_use]
    pub fn repo(&self, name: &str) -> Option<&gantry_git::MemRepo> {
        self.repos.get(name)
    }
}

impl Projects for MemProjects {
    fn get(&self, name: &str) -> Option<&dyn GitRepo> {
        self.repos.get(name).map(|r| r as &dyn GitRepo)
    }

    fn names(&self) -> Vec<String> {
        self.repos.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// .gitmodules
// ---------------------------------------------------------------------------

/// One `[submodule "..."]` section with the keys subscriptions need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionDecl {
    /// Section name.
    pub name: String,
    /// Checkout path of the gitlink.
    pub path: String,
    /// Submodule URL as written.
    pub url: String,
    /// Branch to follow; `.` means the superproject's own branch. Absent
    /// means no subscription.
    pub branch: Option<String>,
}

/// Parse the `[submodule "name"] path/url/branch` subset of `.gitmodules`.
/// Sections missing `path` or `url` are dropped; unknown keys and other
/// sections are ignored.
#[must_use]
pub fn parse_gitmodules(content: &str) -> Vec<SubscriptionDecl> {
    let mut out = Vec::new();
    let mut name: Option<String> = None;
    let mut path = None;
    let mut url = None;
    let mut branch = None;

    let mut flush = |name: &mut Option<String>,
                     path: &mut Option<String>,
                     url: &mut Option<String>,
                     branch: &mut Option<String>| {
        if let (Some(name), Some(path), Some(url)) = (name.take(), path.take(), url.take()) {
            out.push(SubscriptionDecl {
                name,
                path,
                url,
                branch: branch.take(),
            });
        }
        *path = None;
        *url = None;
        *branch = None;
    };

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            flush(&mut name, &mut path, &mut url, &mut branch);
            name = section_name(line);
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = unquote(value.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            "path" => path = Some(value),
            "url" => url = Some(value),
            "branch" => branch = Some(value),
            _ => {}
        }
    }
    flush(&mut name, &mut path, &mut url, &mut branch);
    out
}

/// `[submodule "x"]` → `x`; any other section → `None`.
fn section_name(line: &str) -> Option<String> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    let rest = inner.strip_prefix("submodule")?.trim();
    Some(unquote(rest))
}

fn unquote(value: &str) -> String {
    let v = value.trim();
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        v[1..v.len() - 1].to_owned()
    } else {
        v.to_owned()
    }
}

/// Resolve a `.gitmodules` URL to a project name served at
/// `canonical_origin`. Absolute URLs must live under the origin; relative
/// ones resolve against `<origin>/<superproject>`. Anything else is foreign
/// and yields `None`.
#[must_use]
pub fn resolve_project(url: &str, canonical_origin: &str, superproject: &str) -> Option<String> {
    let origin = canonical_origin.trim_end_matches('/');
    let clean = |name: &str| {
        let name = name.trim_matches('/');
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            None
        } else {
            Some(name.to_owned())
        }
    };

    if url.starts_with("./") || url.starts_with("../") {
        let mut parts: Vec<&str> = superproject.split('/').filter(|p| !p.is_empty()).collect();
        for seg in url.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    parts.pop()?;
                }
                seg => parts.push(seg),
            }
        }
        return clean(&parts.join("/"));
    }
    let rest = url.strip_prefix(origin)?;
    let rest = rest.strip_prefix('/')?;
    clean(rest)
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// A gitlink bump that was committed to a superproject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedGitlink {
    /// The superproject that was updated.
    pub superproject: String,
    /// Its branch, short name.
    pub branch: String,
    /// The commit installed on that branch.
    pub commit: GitOid,
}

/// Fans branch updates out to subscribed superprojects.
pub struct SuperprojectUpdater<'a> {
    projects: &'a dyn Projects,
    canonical_origin: String,
    service: Persona,
    verbosity: Verbosity,
    max_subjects: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Edge {
    subscriber: String,
    branch: String,
    path: String,
}

type SubscriptionMap = BTreeMap<(String, String), Vec<Edge>>;

/// One step of a propagation cascade: `key`'s branch moved to `tip`, and
/// `path` is the chain of (project, branch) nodes updated to get here,
/// origin first. Revisiting a node on the same path would loop forever.
struct Event {
    key: (String, String),
    tip: GitOid,
    path: Vec<(String, String)>,
}

impl<'a> SuperprojectUpdater<'a> {
    pub fn new(
        projects: &'a dyn Projects,
        canonical_origin: &str,
        service: Persona,
        verbosity: Verbosity,
        max_subjects: usize,
    ) -> Self {
        Self {
            projects,
            canonical_origin: canonical_origin.trim_end_matches('/').to_owned(),
            service,
            verbosity,
            max_subjects,
        }
    }

    /// React to `project`'s `branch` having moved to `new_tip`. Returns the
    /// gitlink commits that were applied; everything that could not be
    /// applied has been logged and skipped.
    ///
    /// An edge that would update a branch already updated earlier on the same
    /// propagation path closes a subscription cycle and is suppressed. A
    /// branch reached twice over *different* paths (a diamond) is updated
    /// both times, once per gitlink.
    pub fn on_branch_updated(
        &self,
        project: &str,
        branch: &RefName,
        new_tip: GitOid,
    ) -> Vec<AppliedGitlink> {
        let map = match self.subscriptions() {
            Ok(map) => map,
            Err(error) => {
                tracing::warn!(%error, "could not scan superproject subscriptions");
                return Vec::new();
            }
        };
        let origin = (project.to_owned(), short_branch(branch));

        let mut applied = Vec::new();
        let mut queue: VecDeque<Event> = VecDeque::new();
        queue.push_back(Event {
            key: origin.clone(),
            tip: new_tip,
            path: vec![origin],
        });

        while let Some(event) = queue.pop_front() {
            let Some(edges) = map.get(&event.key) else {
                continue;
            };
            for edge in edges {
                let target = (edge.subscriber.clone(), edge.branch.clone());
                if event.path.contains(&target) {
                    tracing::warn!(
                        superproject = %edge.subscriber,
                        branch = %edge.branch,
                        submodule = %event.key.0,
                        "subscription cycle detected; skipping gitlink update"
                    );
                    continue;
                }
                match self.apply(edge, &event.key.0, &event.key.1, event.tip) {
                    Ok(Some(commit)) => {
                        applied.push(AppliedGitlink {
                            superproject: edge.subscriber.clone(),
                            branch: edge.branch.clone(),
                            commit,
                        });
                        let mut path = event.path.clone();
                        path.push(target.clone());
                        queue.push_back(Event {
                            key: target,
                            tip: commit,
                            path,
                        });
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(
                            superproject = %edge.subscriber,
                            branch = %edge.branch,
                            %error,
                            "skipping gitlink update"
                        );
                    }
                }
            }
        }
        applied
    }

    /// Scan every served project's branch tips for subscriptions, keyed by
    /// the (project, branch) they follow.
    fn subscriptions(&self) -> Result<SubscriptionMap, GitError> {
        let mut map = SubscriptionMap::new();
        for superproject in self.projects.names() {
            let Some(repo) = self.projects.get(&superproject) else {
                continue;
            };
            for (name, tip) in repo.list_refs("refs/heads/")? {
                let branch = short_branch(&name);
                let Some(content) = gitmodules_at(repo, tip)? else {
                    continue;
                };
                for decl in parse_gitmodules(&content) {
                    let Some(target_branch) = decl.branch.as_deref() else {
                        continue;
                    };
                    let Some(target) =
                        resolve_project(&decl.url, &self.canonical_origin, &superproject)
                    else {
                        continue;
                    };
                    let target_branch = if target_branch == "." {
                        branch.clone()
                    } else {
                        target_branch.to_owned()
                    };
                    map.entry((target, target_branch)).or_default().push(Edge {
                        subscriber: superproject.clone(),
                        branch: branch.clone(),
                        path: decl.path,
                    });
                }
            }
        }
        Ok(map)
    }

    /// Commit an updated gitlink into one subscriber. `Ok(None)` means the
    /// gitlink was already current.
    fn apply(
        &self,
        edge: &Edge,
        submodule_project: &str,
        submodule_branch: &str,
        submodule_tip: GitOid,
    ) -> Result<Option<GitOid>, GitError> {
        let repo = self.projects.get(&edge.subscriber).ok_or_else(|| GitError::NotFound {
            message: format!("project {} not served", edge.subscriber),
        })?;
        let branch_ref = RefName::new(&format!("refs/heads/{}", edge.branch))
            .map_err(|e| GitError::BackendError {
                message: e.to_string(),
            })?;
        let Some(tip) = repo.read_ref(&branch_ref)? else {
            return Ok(None);
        };
        let tip_tree = repo.read_commit(tip)?.tree_oid;

        let old = merge::entry_at(repo, tip_tree, &edge.path)?;
        if old == Some((EntryMode::Commit, submodule_tip)) {
            return Ok(None);
        }
        let old_gitlink = match old {
            Some((EntryMode::Commit, oid)) => Some(oid),
            _ => None,
        };

        let new_tree = repo.edit_tree(
            tip_tree,
            &[TreeEdit::Upsert {
                path: edge.path.clone(),
                mode: EntryMode::Commit,
                oid: submodule_tip,
            }],
        )?;
        let message = self.update_message(
            &edge.path,
            submodule_project,
            submodule_branch,
            submodule_tip,
            old_gitlink,
        );
        let commit = repo.create_commit(&NewCommit {
            tree_oid: new_tree,
            parents: vec![tip],
            message,
            author: self.service.clone(),
            committer: self.service.clone(),
        })?;

        let transition = repo.update_ref(&RefEdit {
            name: branch_ref.clone(),
            new_oid: commit,
            expected_old_oid: tip,
        })?;
        if !transition.is_applied() {
            tracing::warn!(
                superproject = %edge.subscriber,
                branch = %edge.branch,
                "gitlink update lost the ref lock; skipping"
            );
            return Ok(None);
        }
        Ok(Some(commit))
    }

    fn update_message(
        &self,
        path: &str,
        submodule_project: &str,
        submodule_branch: &str,
        submodule_tip: GitOid,
        old_gitlink: Option<GitOid>,
    ) -> String {
        let mut message = String::from("Update git submodules\n");
        if self.verbosity == Verbosity::Off {
            return message;
        }
        message.push('\n');
        message.push_str(&format!(
            "* Update {path} from branch '{submodule_branch}'\n"
        ));
        if self.verbosity == Verbosity::Full {
            if let Some(repo) = self.projects.get(submodule_project) {
                for subject in
                    new_subjects(repo, submodule_tip, old_gitlink, self.max_subjects)
                {
                    message.push_str("  - ");
                    message.push_str(&subject);
                    message.push('\n');
                }
            }
        }
        message
    }
}

fn short_branch(name: &RefName) -> String {
    name.as_str()
        .strip_prefix("refs/heads/")
        .unwrap_or(name.as_str())
        .to_owned()
}

/// The `.gitmodules` blob at a commit, if any.
fn gitmodules_at(repo: &dyn GitRepo, commit: GitOid) -> Result<Option<String>, GitError> {
    let tree = repo.read_commit(commit)?.tree_oid;
    for entry in repo.read_tree(tree)? {
        if entry.name == ".gitmodules" && entry.mode != EntryMode::Tree {
            let data = repo.read_blob(entry.oid)?;
            return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
        }
    }
    Ok(None)
}

/// Subjects of commits reachable from `tip` but not from `stop`, newest
/// first, capped. Walk errors just end the listing.
fn new_subjects(
    repo: &dyn GitRepo,
    tip: GitOid,
    stop: Option<GitOid>,
    cap: usize,
) -> Vec<String> {
    let mut subjects = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(tip);
    while let Some(oid) = queue.pop_front() {
        if subjects.len() >= cap {
            break;
        }
        if Some(oid) == stop || !seen.insert(oid) {
            continue;
        }
        let Ok(info) = repo.read_commit(oid) else {
            break;
        };
        subjects.push(info.subject().to_owned());
        for parent in info.parents {
            queue.push_back(parent);
        }
    }
    subjects
}
