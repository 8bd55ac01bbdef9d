//! What different viewers see in the ref advertisement.

mod common;

use common::{ID1, Review, commit, reviewed};
use gantry::{Access, AccountId, RefCommand, RuleSet};
use gantry_git::{GitRepo, RefName};

fn names(w: &Review, viewer: AccountId) -> Vec<String> {
    w.engine()
        .advertise("widget", viewer)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name.as_str().to_owned())
        .collect()
}

#[test]
fn advertisement_leads_with_head() {
    let mut w = Review::single();
    w.seed_branch("widget", "master");

    let listed = names(&w, w.dev);
    assert_eq!(listed[0], "HEAD");
    assert!(listed.contains(&"refs/heads/master".to_owned()));
}

#[test]
fn private_changes_are_owner_only() {
    let mut w = Review::single();
    let stranger = w.directory.add("outsider@example.com");
    let auditor = w.directory.add("auditor@example.com");
    w.perms = RuleSet::open()
        .allow(Some(auditor), Access::ViewPrivateChanges, "*")
        .unwrap();

    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("secret", ID1));
    w.push("widget", RefCommand::create("refs/for/master%private", pushed));

    let ps = "refs/changes/01/1/1".to_owned();
    assert!(names(&w, w.dev).contains(&ps), "owner sees it");
    assert!(!names(&w, stranger).contains(&ps));
    assert!(names(&w, auditor).contains(&ps), "privileged viewer sees it");
}

#[test]
fn draft_changes_extend_to_invited_reviewers() {
    let mut w = Review::single();
    let alice = w.directory.add("alice@example.com");
    let stranger = w.directory.add("outsider@example.com");

    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("wip", ID1));
    w.push(
        "widget",
        RefCommand::create("refs/drafts/master%r=alice@example.com", pushed),
    );

    let ps = "refs/changes/01/1/1".to_owned();
    assert!(names(&w, w.dev).contains(&ps));
    assert!(names(&w, alice).contains(&ps), "invited reviewer sees the draft");
    assert!(!names(&w, stranger).contains(&ps));
}

#[test]
fn meta_refs_are_gated_by_config() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));
    w.push("widget", RefCommand::create("refs/for/master", pushed));
    // Simulate a recorded review-metadata commit for change 1.
    let meta = commit(w.repo("widget"), &[], &[("review", "notes")], "meta\n");
    let name = RefName::new("refs/changes/01/1/meta").unwrap();
    w.repo("widget").write_ref(&name, meta, "setup").unwrap();

    let meta_ref = "refs/changes/01/1/meta".to_owned();
    assert!(!names(&w, w.dev).contains(&meta_ref), "off by default");
    w.config.review.meta_refs = true;
    assert!(names(&w, w.dev).contains(&meta_ref));
}

#[test]
fn hidden_branch_takes_its_review_refs_with_it() {
    let mut w = Review::single();
    let stranger = w.directory.add("outsider@example.com");
    w.perms = RuleSet::open()
        .deny(Some(stranger), Access::Read, "refs/heads/secret")
        .unwrap();

    w.seed_branch("widget", "master");
    let secret_base = w.seed_branch("widget", "secret");
    let pushed = commit(
        w.repo("widget"),
        &[secret_base],
        &[("a", "1")],
        &reviewed("hush", ID1),
    );
    w.push("widget", RefCommand::create("refs/for/secret", pushed));

    let for_stranger = names(&w, stranger);
    assert!(!for_stranger.contains(&"refs/heads/secret".to_owned()));
    assert!(!for_stranger.contains(&"refs/changes/01/1/1".to_owned()));
    assert!(for_stranger.contains(&"refs/heads/master".to_owned()));

    let for_dev = names(&w, w.dev);
    assert!(for_dev.contains(&"refs/heads/secret".to_owned()));
    assert!(for_dev.contains(&"refs/changes/01/1/1".to_owned()));
}
