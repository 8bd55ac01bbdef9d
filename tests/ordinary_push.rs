//! Ordinary ref updates: everything outside the magic and review namespaces.

mod common;

use common::{ID1, Review, commit, ok_messages, rejection, reviewed};
use gantry::{Access, RefCommand, RuleSet};
use gantry_git::{GitRepo, RefName};

#[test]
fn fast_forward_push_moves_the_branch() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let next = commit(w.repo("widget"), &[base], &[("a", "1")], "work\n");

    let result = w.push("widget", RefCommand::update("refs/heads/master", base, next));
    assert!(ok_messages(&result).is_empty());
    assert_eq!(w.tip("widget", "master"), Some(next));
}

#[test]
fn push_to_unborn_branch_creates_it() {
    let w = Review::single();
    let root = commit(w.repo("widget"), &[], &[("README", "hi")], "first\n");

    let result = w.push("widget", RefCommand::create("refs/heads/master", root));
    assert!(ok_messages(&result).is_empty());
    assert_eq!(w.tip("widget", "master"), Some(root));
}

#[test]
fn batch_commands_resolve_independently() {
    let mut w = Review::single();
    w.perms = RuleSet::open()
        .deny(None, Access::Push, "refs/heads/locked")
        .unwrap();
    let base = w.seed_branch("widget", "master");
    let next = commit(w.repo("widget"), &[base], &[("a", "1")], "work\n");

    let results = w.engine().receive(
        "widget",
        w.dev,
        &[
            RefCommand::update("refs/heads/master", base, next),
            RefCommand::create("refs/heads/locked", next),
        ],
        common::WHEN,
    );
    assert!(results[0].status.is_ok());
    assert_eq!(rejection(&results[1]), "prohibited by policy");
    assert_eq!(w.tip("widget", "master"), Some(next), "the good half landed");
    assert_eq!(w.tip("widget", "locked"), None);
}

#[test]
fn rules_apply_per_identity() {
    let mut w = Review::single();
    let intern = w.directory.add("intern@example.com");
    w.perms = RuleSet::open()
        .deny(Some(intern), Access::Push, "refs/heads/release/*")
        .unwrap();
    let base = w.seed_branch("widget", "release/1.0");
    let next = commit(w.repo("widget"), &[base], &[("fix", "1")], "hotfix\n");

    let blocked = w.push_as(
        "widget",
        intern,
        RefCommand::update("refs/heads/release/1.0", base, next),
    );
    assert_eq!(rejection(&blocked), "prohibited by policy");

    let allowed = w.push("widget", RefCommand::update("refs/heads/release/1.0", base, next));
    assert!(allowed.status.is_ok());
}

#[test]
fn tags_are_ordinary_refs() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");

    let result = w.push("widget", RefCommand::create("refs/tags/v1.0", base));
    assert!(ok_messages(&result).is_empty());
    let tag = RefName::new("refs/tags/v1.0").unwrap();
    assert_eq!(w.repo("widget").read_ref(&tag).unwrap(), Some(base));

    let deleted = w.push("widget", RefCommand::delete("refs/tags/v1.0", base));
    assert_eq!(rejection(&deleted), "cannot delete references");
}

#[test]
fn direct_writes_to_change_refs_are_prohibited() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));
    w.push("widget", RefCommand::create("refs/for/master", pushed));

    let forged = commit(w.repo("widget"), &[base], &[("a", "evil")], "forged\n");
    let result = w.push(
        "widget",
        RefCommand::update("refs/changes/01/1/1", pushed, forged),
    );
    assert_eq!(rejection(&result), "prohibited by policy");

    let ps = RefName::new("refs/changes/01/1/1").unwrap();
    assert_eq!(
        w.repo("widget").read_ref(&ps).unwrap(),
        Some(pushed),
        "patch set history stays immutable"
    );
}
