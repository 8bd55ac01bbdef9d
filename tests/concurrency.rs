//! Concurrent pushes against one served project.
//!
//! Submit serializes on the destination ref with a compare-and-swap plus one
//! rebuild, so two racing `%submit` pushes must both land. Ordinary pushes
//! have no retry: exactly one racer wins the ref.

mod common;

use std::thread;

use common::{ID1, ID2, Review, WHEN, commit, ok_messages, reviewed};
use gantry::{ChangeNumber, ChangeStatus, ChangeStore, RefCommand, RefStatus};
use gantry_git::GitRepo;

#[test]
fn racing_submits_both_land() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let change_a = commit(w.repo("widget"), &[base], &[("f_a", "1")], &reviewed("a", ID1));
    let change_b = commit(w.repo("widget"), &[base], &[("f_b", "1")], &reviewed("b", ID2));

    thread::scope(|scope| {
        for pushed in [change_a, change_b] {
            let w = &w;
            scope.spawn(move || {
                let results = w.engine().receive(
                    "widget",
                    w.dev,
                    &[RefCommand::create("refs/for/master%submit", pushed)],
                    WHEN,
                );
                assert!(ok_messages(&results[0]).is_empty());
            });
        }
    });

    for number in [1, 2] {
        assert_eq!(
            w.store.get(ChangeNumber(number)).unwrap().status,
            ChangeStatus::Merged,
            "change {number} merged"
        );
    }

    // Whatever the interleaving, the final tip contains both edits.
    let tip = w.tip("widget", "master").unwrap();
    let tree = w.repo("widget").read_commit(tip).unwrap().tree_oid;
    let names: Vec<String> = w
        .repo("widget")
        .read_tree(tree)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert!(names.contains(&"f_a".to_owned()), "tree: {names:?}");
    assert!(names.contains(&"f_b".to_owned()), "tree: {names:?}");
}

#[test]
fn racing_direct_pushes_have_one_winner() {
    let mut w = Review::single();
    let base = w.seed_branch("widget", "master");
    let side_a = commit(w.repo("widget"), &[base], &[("a", "1")], "a\n");
    let side_b = commit(w.repo("widget"), &[base], &[("b", "1")], "b\n");

    let statuses: Vec<RefStatus> = thread::scope(|scope| {
        let handles: Vec<_> = [side_a, side_b]
            .into_iter()
            .map(|next| {
                let w = &w;
                scope.spawn(move || {
                    let mut results = w.engine().receive(
                        "widget",
                        w.dev,
                        &[RefCommand::update("refs/heads/master", base, next)],
                        WHEN,
                    );
                    results.remove(0).status
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = statuses.iter().filter(|s| s.is_ok()).count();
    assert_eq!(winners, 1, "statuses: {statuses:?}");
    let loser = statuses.iter().find(|s| !s.is_ok()).unwrap();
    match loser {
        RefStatus::Rejected { reason } => {
            assert_eq!(reason.to_string(), "failed to lock refs/heads/master");
        }
        RefStatus::Ok { .. } => unreachable!(),
    }

    let tip = w.tip("widget", "master").unwrap();
    assert!(tip == side_a || tip == side_b);
}
