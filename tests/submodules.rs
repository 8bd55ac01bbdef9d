//! Superproject subscriptions: branch updates fan out to gitlinks after the
//! push that caused them.

mod common;

use common::{ID1, Review, commit, commit_edits, gitmodules, ok_messages, reviewed};
use gantry::{RefCommand, Verbosity};
use gantry_git::{EntryMode, GitOid, GitRepo, TreeEdit};

/// Serve `lib` plus a superproject `app` whose `master` subscribes to
/// `lib`'s `master` at path `lib`. Returns (lib tip, app tip).
fn with_subscription(w: &mut Review, url: &str) -> (GitOid, GitOid) {
    w.add_project("lib");
    w.add_project("app");
    let lib_base = w.seed_branch("lib", "master");

    let app_repo = w.repo("app");
    let modules = app_repo
        .write_blob(gitmodules(&[("lib", url, "master")]).as_bytes())
        .unwrap();
    let app_base = commit_edits(
        app_repo,
        &[],
        &[
            TreeEdit::Upsert {
                path: ".gitmodules".to_owned(),
                mode: EntryMode::Blob,
                oid: modules,
            },
            TreeEdit::Upsert {
                path: "lib".to_owned(),
                mode: EntryMode::Commit,
                oid: lib_base,
            },
        ],
        "wire up lib\n",
    );
    common::set_branch(app_repo, "master", app_base);
    (lib_base, app_base)
}

#[test]
fn push_to_library_updates_the_superproject_gitlink() {
    let mut w = Review::empty();
    let (lib_base, app_base) = with_subscription(&mut w, "http://localhost:8080/lib");

    let next = commit(w.repo("lib"), &[lib_base], &[("src", "v2")], "add feature\n");
    let result = w.push("lib", RefCommand::update("refs/heads/master", lib_base, next));
    assert!(ok_messages(&result).is_empty());

    let app_tip = w.tip("app", "master").unwrap();
    assert_ne!(app_tip, app_base, "superproject advanced");
    assert_eq!(
        common::entry_in(w.repo("app"), app_tip, "lib"),
        Some((EntryMode::Commit, next)),
        "gitlink follows the branch"
    );

    let info = w.repo("app").read_commit(app_tip).unwrap();
    assert_eq!(info.parents, vec![app_base]);
    assert_eq!(
        info.message,
        "Update git submodules\n\n* Update lib from branch 'master'\n  - add feature\n"
    );
    assert!(info.committer.contains("gantry@localhost"), "service identity");
}

#[test]
fn submit_on_push_propagates_too() {
    let mut w = Review::empty();
    let (lib_base, _) = with_subscription(&mut w, "http://localhost:8080/lib");

    let pushed = commit(
        w.repo("lib"),
        &[lib_base],
        &[("src", "v2")],
        &reviewed("reviewed feature", ID1),
    );
    let result = w.push("lib", RefCommand::create("refs/for/master%submit", pushed));
    assert!(ok_messages(&result).is_empty());

    assert_eq!(w.tip("lib", "master"), Some(pushed));
    let app_tip = w.tip("app", "master").unwrap();
    assert_eq!(
        common::entry_in(w.repo("app"), app_tip, "lib"),
        Some((EntryMode::Commit, pushed))
    );
}

#[test]
fn update_verbosity_is_configurable() {
    for (verbosity, expected) in [
        (
            Verbosity::SubjectOnly,
            "Update git submodules\n\n* Update lib from branch 'master'\n",
        ),
        (Verbosity::Off, "Update git submodules\n"),
    ] {
        let mut w = Review::empty();
        w.config.submodules.update_verbosity = verbosity;
        let (lib_base, _) = with_subscription(&mut w, "http://localhost:8080/lib");

        let next = commit(w.repo("lib"), &[lib_base], &[("src", "v2")], "add feature\n");
        w.push("lib", RefCommand::update("refs/heads/master", lib_base, next));

        let app_tip = w.tip("app", "master").unwrap();
        let message = w.repo("app").read_commit(app_tip).unwrap().message;
        assert_eq!(message, expected, "verbosity {verbosity:?}");
    }
}

#[test]
fn relative_urls_resolve_against_the_origin() {
    let mut w = Review::empty();
    let (lib_base, _) = with_subscription(&mut w, "../lib");

    let next = commit(w.repo("lib"), &[lib_base], &[("src", "v2")], "relative\n");
    w.push("lib", RefCommand::update("refs/heads/master", lib_base, next));

    let app_tip = w.tip("app", "master").unwrap();
    assert_eq!(
        common::entry_in(w.repo("app"), app_tip, "lib"),
        Some((EntryMode::Commit, next))
    );
}

#[test]
fn foreign_urls_are_ignored() {
    let mut w = Review::empty();
    let (lib_base, app_base) = with_subscription(&mut w, "https://github.com/example/lib");

    let next = commit(w.repo("lib"), &[lib_base], &[("src", "v2")], "foreign\n");
    let result = w.push("lib", RefCommand::update("refs/heads/master", lib_base, next));
    assert!(result.status.is_ok());

    assert_eq!(w.tip("app", "master"), Some(app_base), "no subscription, no update");
}

#[test]
fn chained_superprojects_update_transitively() {
    let mut w = Review::empty();
    let (lib_base, _) = with_subscription(&mut w, "http://localhost:8080/lib");

    // `top` subscribes to `app`, which subscribes to `lib`.
    w.add_project("top");
    let top_repo = w.repo("top");
    let modules = top_repo
        .write_blob(gitmodules(&[("app", "http://localhost:8080/app", "master")]).as_bytes())
        .unwrap();
    let app_tip = w.tip("app", "master").unwrap();
    let top_base = commit_edits(
        top_repo,
        &[],
        &[
            TreeEdit::Upsert {
                path: ".gitmodules".to_owned(),
                mode: EntryMode::Blob,
                oid: modules,
            },
            TreeEdit::Upsert {
                path: "app".to_owned(),
                mode: EntryMode::Commit,
                oid: app_tip,
            },
        ],
        "wire up app\n",
    );
    common::set_branch(top_repo, "master", top_base);

    let next = commit(w.repo("lib"), &[lib_base], &[("src", "v2")], "deep change\n");
    w.push("lib", RefCommand::update("refs/heads/master", lib_base, next));

    let new_app_tip = w.tip("app", "master").unwrap();
    assert_eq!(
        common::entry_in(w.repo("app"), new_app_tip, "lib"),
        Some((EntryMode::Commit, next))
    );
    let top_tip = w.tip("top", "master").unwrap();
    assert_eq!(
        common::entry_in(w.repo("top"), top_tip, "app"),
        Some((EntryMode::Commit, new_app_tip)),
        "the cascade reaches the outer superproject"
    );
}
