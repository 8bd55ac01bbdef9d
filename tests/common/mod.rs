//! Shared test helpers for gantry integration tests.
//!
//! Every scenario builds its own [`Review`] world: served projects, review
//! store, account directory, and permission rules, all in memory. The
//! helpers here cover the commit and push plumbing; the scenarios live in
//! the sibling files.

#![allow(dead_code)]

use std::collections::BTreeMap;

use gantry::{
    AccountId, CommandResult, Engine, EngineConfig, MemChangeStore, MemDirectory, MemProjects,
    ProjectConfig, RefCommand, RefStatus, RuleSet,
};
use gantry_git::{EntryMode, GitOid, GitRepo, MemRepo, NewCommit, Persona, RefName, TreeEdit};

/// Timestamp used for everything a test commits.
pub const WHEN: i64 = 1_700_000_000;

pub const ID1: &str = "I1111111111111111111111111111111111111111";
pub const ID2: &str = "I2222222222222222222222222222222222222222";

/// A complete single-node review world.
pub struct Review {
    pub projects: MemProjects,
    pub store: MemChangeStore,
    pub directory: MemDirectory,
    pub perms: RuleSet,
    pub configs: BTreeMap<String, ProjectConfig>,
    pub config: EngineConfig,
    /// The default pusher, registered as `dev@example.com`.
    pub dev: AccountId,
}

impl Review {
    /// A world with no served projects yet.
    pub fn empty() -> Self {
        let directory = MemDirectory::new();
        let dev = directory.add("dev@example.com");
        Self {
            projects: MemProjects::new(),
            store: MemChangeStore::new(),
            directory,
            perms: RuleSet::open(),
            configs: BTreeMap::new(),
            config: EngineConfig::default(),
            dev,
        }
    }

    /// One served project `widget` under open rules. Branches are seeded by
    /// the scenario.
    pub fn single() -> Self {
        let mut review = Self::empty();
        review.add_project("widget");
        review
    }

    /// Serve an empty project under the default policy.
    pub fn add_project(&mut self, name: &str) {
        self.projects.create(name);
        self.configs
            .insert(name.to_owned(), ProjectConfig::new(name));
    }

    /// Point `refs/heads/<branch>` at a fresh root commit and return it.
    pub fn seed_branch(&mut self, project: &str, branch: &str) -> GitOid {
        let repo = self.repo(project);
        let oid = commit(
            repo,
            &[],
            &[("README", branch)],
            &format!("seed {branch}\n"),
        );
        set_branch(repo, branch, oid);
        oid
    }

    pub fn repo(&self, project: &str) -> &MemRepo {
        self.projects.repo(project).expect("project is served")
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine::new(
            &self.projects,
            &self.store,
            &self.directory,
            &self.perms,
            &self.configs,
            self.config.clone(),
        )
    }

    /// Push one command as `dev` and return its result.
    pub fn push(&self, project: &str, cmd: RefCommand) -> CommandResult {
        self.push_as(project, self.dev, cmd)
    }

    pub fn push_as(&self, project: &str, who: AccountId, cmd: RefCommand) -> CommandResult {
        let mut results = self.engine().receive(project, who, &[cmd], WHEN);
        assert_eq!(results.len(), 1, "one command, one result");
        results.remove(0)
    }

    /// Current tip of `refs/heads/<branch>`, if born.
    pub fn tip(&self, project: &str, branch: &str) -> Option<GitOid> {
        let name = RefName::new(&format!("refs/heads/{branch}")).unwrap();
        self.repo(project).read_ref(&name).unwrap()
    }
}

/// A commit message carrying the review trailer.
pub fn reviewed(subject: &str, change_id: &str) -> String {
    format!("{subject}\n\nChange-Id: {change_id}\n")
}

pub fn persona(email: &str) -> Persona {
    Persona {
        name: "Dev".to_owned(),
        email: email.to_owned(),
        when: WHEN,
    }
}

/// Commit `files` upserted over the first parent's tree (or an empty tree).
pub fn commit(repo: &MemRepo, parents: &[GitOid], files: &[(&str, &str)], message: &str) -> GitOid {
    let edits: Vec<TreeEdit> = files
        .iter()
        .map(|(path, content)| TreeEdit::Upsert {
            path: (*path).to_owned(),
            mode: EntryMode::Blob,
            oid: repo.write_blob(content.as_bytes()).unwrap(),
        })
        .collect();
    commit_edits(repo, parents, &edits, message)
}

/// Commit arbitrary tree edits; lets scenarios place gitlinks.
pub fn commit_edits(
    repo: &MemRepo,
    parents: &[GitOid],
    edits: &[TreeEdit],
    message: &str,
) -> GitOid {
    let base_tree = match parents.first() {
        Some(parent) => repo.read_commit(*parent).unwrap().tree_oid,
        None => repo.write_tree(&[]).unwrap(),
    };
    let tree = repo.edit_tree(base_tree, edits).unwrap();
    let dev = persona("dev@example.com");
    repo.create_commit(&NewCommit {
        tree_oid: tree,
        parents: parents.to_vec(),
        message: message.to_owned(),
        author: dev.clone(),
        committer: dev,
    })
    .unwrap()
}

pub fn set_branch(repo: &MemRepo, branch: &str, oid: GitOid) {
    let name = RefName::new(&format!("refs/heads/{branch}")).unwrap();
    repo.write_ref(&name, oid, "test setup").unwrap();
}

/// `.gitmodules` text for `(name, url, branch)` entries; path = name.
pub fn gitmodules(entries: &[(&str, &str, &str)]) -> String {
    let mut out = String::new();
    for (name, url, branch) in entries {
        out.push_str(&format!(
            "[submodule \"{name}\"]\n\tpath = {name}\n\turl = {url}\n\tbranch = {branch}\n"
        ));
    }
    out
}

/// The advisory messages of a result that must be `Ok`.
pub fn ok_messages(result: &CommandResult) -> &[String] {
    match &result.status {
        RefStatus::Ok { messages } => messages,
        RefStatus::Rejected { reason } => {
            panic!("{} was rejected: {reason}", result.ref_name)
        }
    }
}

/// The display string of a result that must be `Rejected`.
pub fn rejection(result: &CommandResult) -> String {
    match &result.status {
        RefStatus::Rejected { reason } => reason.to_string(),
        RefStatus::Ok { .. } => panic!("{} unexpectedly succeeded", result.ref_name),
    }
}

/// Read the blob or gitlink entry at `path` in the commit's root tree.
pub fn entry_in(repo: &MemRepo, commit: GitOid, path: &str) -> Option<(EntryMode, GitOid)> {
    let tree = repo.read_commit(commit).unwrap().tree_oid;
    repo.read_tree(tree)
        .unwrap()
        .into_iter()
        .find(|e| e.name == path)
        .map(|e| (e.mode, e.oid))
}
