//! Pushing to `refs/for/<branch>`: change creation, patch set stacking, and
//! the `%`-option surface.

mod common;

use common::{ID1, ID2, Review, commit, ok_messages, rejection, reviewed};
use gantry::{Access, ChangeNumber, ChangeStatus, ChangeStore, RefCommand, RuleSet};
use gantry_git::{GitRepo, RefName};

#[test]
fn review_push_creates_change_one() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push("widget", RefCommand::create("refs/for/master", pushed));
    assert!(ok_messages(&result).is_empty());

    let change = w.store.get(ChangeNumber(1)).expect("change recorded");
    assert_eq!(change.status, ChangeStatus::New);
    assert_eq!(change.owner, w.dev);
    assert_eq!(change.dest.as_str(), "refs/heads/master");
    assert_eq!(change.current_patch_set, 1);

    // The patch set ref is sharded by change number.
    let ps = RefName::new("refs/changes/01/1/1").unwrap();
    assert_eq!(w.repo("widget").read_ref(&ps).unwrap(), Some(pushed));
    // The destination branch itself did not move.
    assert_eq!(w.tip("widget", "master"), Some(base));
}

#[test]
fn amended_commit_becomes_patch_set_two() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let v1 = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));
    let v2 = commit(w.repo("widget"), &[base], &[("a", "2")], &reviewed("add a v2", ID1));

    w.push("widget", RefCommand::create("refs/for/master", v1));
    let result = w.push("widget", RefCommand::create("refs/for/master", v2));
    assert!(ok_messages(&result).is_empty());

    let change = w.store.get(ChangeNumber(1)).unwrap();
    assert_eq!(change.current_patch_set, 2);
    assert!(w.store.get(ChangeNumber(2)).is_none(), "still one change");

    let ps2 = RefName::new("refs/changes/01/1/2").unwrap();
    assert_eq!(w.repo("widget").read_ref(&ps2).unwrap(), Some(v2));
}

#[test]
fn same_commit_twice_reports_no_new_changes() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    w.push("widget", RefCommand::create("refs/for/master", pushed));
    let again = w.push("widget", RefCommand::create("refs/for/master", pushed));
    assert_eq!(rejection(&again), "no new changes");
}

#[test]
fn unknown_branch_is_rejected() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push("widget", RefCommand::create("refs/for/noSuchBranch", pushed));
    assert_eq!(rejection(&result), "branch noSuchBranch not found");
}

#[test]
fn slash_branches_take_the_longest_prefix() {
    let mut w = Review::single();
    w.seed_branch("widget", "a");
    let base = w.seed_branch("widget", "a/b");
    let pushed = commit(w.repo("widget"), &[base], &[("f", "1")], &reviewed("work", ID1));

    // `a/b` exists, so the remainder is a topic rather than part of the
    // branch name.
    let result = w.push("widget", RefCommand::create("refs/for/a/b/perf", pushed));
    assert!(ok_messages(&result).is_empty());

    let change = w.store.get(ChangeNumber(1)).unwrap();
    assert_eq!(change.dest.as_str(), "refs/heads/a/b");
    assert_eq!(change.topic.as_deref(), Some("perf"));
}

#[test]
fn drafts_ref_and_percent_draft_are_equivalent() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let first = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("one", ID1));
    let second = commit(w.repo("widget"), &[base], &[("b", "1")], &reviewed("two", ID2));

    w.push("widget", RefCommand::create("refs/drafts/master", first));
    w.push("widget", RefCommand::create("refs/for/master%draft", second));

    assert_eq!(w.store.get(ChangeNumber(1)).unwrap().status, ChangeStatus::Draft);
    assert_eq!(w.store.get(ChangeNumber(2)).unwrap().status, ChangeStatus::Draft);
}

#[test]
fn draft_upload_needs_permission() {
    let mut w = Review::single();
    w.perms = RuleSet::open()
        .deny(Some(w.dev), Access::UploadDrafts, "*")
        .unwrap();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("wip", ID1));

    let result = w.push("widget", RefCommand::create("refs/drafts/master", pushed));
    assert_eq!(rejection(&result), "cannot upload drafts");
    assert!(w.store.get(ChangeNumber(1)).is_none(), "nothing recorded");
}

#[test]
fn change_id_discipline_is_fatal() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let repo = w.repo("widget");

    let missing = commit(repo, &[base], &[("a", "1")], "no trailer\n");
    let doubled = commit(
        repo,
        &[base],
        &[("a", "2")],
        &format!("two ids\n\nChange-Id: {ID1}\nChange-Id: {ID2}\n"),
    );
    let malformed = commit(
        repo,
        &[base],
        &[("a", "3")],
        "bad id\n\nChange-Id: Inotvalidhex\n",
    );

    let result = w.push("widget", RefCommand::create("refs/for/master", missing));
    assert_eq!(rejection(&result), "missing Change-Id in commit message footer");
    let result = w.push("widget", RefCommand::create("refs/for/master", doubled));
    assert_eq!(
        rejection(&result),
        "multiple Change-Id lines in commit message footer"
    );
    let result = w.push("widget", RefCommand::create("refs/for/master", malformed));
    assert_eq!(
        rejection(&result),
        "invalid Change-Id line format in commit message footer"
    );
}

#[test]
fn reviewer_and_cc_options_resolve_to_accounts() {
    let mut w = Review::single();
    let alice = w.directory.add("alice@example.com");
    let carol = w.directory.add("carol@example.com");
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push(
        "widget",
        RefCommand::create(
            "refs/for/master%r=alice@example.com,cc=carol@example.com",
            pushed,
        ),
    );
    assert!(ok_messages(&result).is_empty());

    let change = w.store.get(ChangeNumber(1)).unwrap();
    assert!(change.reviewers.contains(&alice));
    assert!(change.ccs.contains(&carol));
}

#[test]
fn unresolved_reviewer_is_advisory() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push(
        "widget",
        RefCommand::create("refs/for/master%r=ghost@example.com", pushed),
    );
    assert_eq!(
        ok_messages(&result),
        &["user \"ghost@example.com\" not found"]
    );
    assert!(w.store.get(ChangeNumber(1)).is_some(), "push still landed");
}

#[test]
fn votes_are_recorded_with_the_patch_set() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push(
        "widget",
        RefCommand::create("refs/for/master%l=Code-Review+2", pushed),
    );
    assert!(ok_messages(&result).is_empty());

    let update = w.store.get(ChangeNumber(1)).unwrap();
    let approvals = w.store.approvals(gantry::PatchSetId {
        change: update.number,
        number: 1,
    });
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].label, "Code-Review");
    assert_eq!(approvals[0].value, 2);
    assert_eq!(approvals[0].account, w.dev);
}

#[test]
fn bogus_label_votes_ride_along_as_messages() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push(
        "widget",
        RefCommand::create("refs/for/master%l=Code-Review+9,l=Vrified+1", pushed),
    );
    assert_eq!(
        ok_messages(&result),
        &[
            "label \"Code-Review\": 9 is not a valid value",
            "label \"Vrified\" is not a configured label",
        ]
    );
}

#[test]
fn unknown_option_is_a_parse_rejection() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push(
        "widget",
        RefCommand::create("refs/for/master%wip", pushed),
    );
    assert_eq!(rejection(&result), "unknown option: wip");
}

#[test]
fn closed_change_rejects_the_next_patch_set() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let v1 = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));
    w.push("widget", RefCommand::create("refs/for/master%submit", v1));
    assert_eq!(
        w.store.get(ChangeNumber(1)).unwrap().status,
        ChangeStatus::Merged
    );

    let v2 = commit(w.repo("widget"), &[v1], &[("a", "2")], &reviewed("add a v2", ID1));
    let result = w.push("widget", RefCommand::create("refs/for/master", v2));
    assert_eq!(rejection(&result), "change 1 closed");
}

#[test]
fn private_and_message_options_flow_into_the_record() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let pushed = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("add a", ID1));

    let result = w.push(
        "widget",
        RefCommand::create("refs/for/master%private,m=rebased_onto_tip", pushed),
    );
    assert!(ok_messages(&result).is_empty());

    let change = w.store.get(ChangeNumber(1)).unwrap();
    assert!(change.private);
    let sets = w.store.patch_sets(ChangeNumber(1));
    assert_eq!(sets[0].description.as_deref(), Some("rebased onto tip"));
}

#[test]
fn batch_commands_succeed_and_fail_independently() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let good = commit(w.repo("widget"), &[base], &[("a", "1")], &reviewed("good", ID1));
    let bad = commit(w.repo("widget"), &[base], &[("b", "1")], &reviewed("bad", ID2));

    let results = w.engine().receive(
        "widget",
        w.dev,
        &[
            RefCommand::create("refs/for/master", good),
            RefCommand::create("refs/for/ghost", bad),
        ],
        common::WHEN,
    );
    assert!(results[0].status.is_ok());
    assert_eq!(rejection(&results[1]), "branch ghost not found");
    assert!(w.store.get(ChangeNumber(1)).is_some());
    assert!(w.store.get(ChangeNumber(2)).is_none());
}
