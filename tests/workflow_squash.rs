//! SQUASH mode end-to-end: first migration, baseline tracking, idempotence.

mod common;

use std::sync::Arc;

use ferry::console::CaptureConsole;
use ferry::destination::GitDestination;
use ferry::model::Author;
use ferry::origin::GitOrigin;
use ferry::workflow::{Workflow, WorkflowMode};
use ferry_git::RepoCache;

use common::*;

fn committer() -> Author {
    Author::new("Carl Committer", "carl@example.com")
}

fn squash_workflow(
    origin_url: String,
    dest_url: String,
    cache: Arc<RepoCache>,
    force: bool,
) -> Workflow {
    let origin = GitOrigin::new(Arc::clone(&cache), origin_url, "HEAD").label("TestOrigin-RevId");
    let dest = GitDestination::new(cache, dest_url, "main", "main", committer()).force(force);
    Workflow::new("default", WorkflowMode::Squash, Box::new(origin), Box::new(dest)).force(force)
}

#[test]
fn first_migration_creates_single_labeled_commit() {
    let (origin_dir, origin_repo) = setup_repo();
    let c1 = commit_file(&origin_repo, origin_dir.path(), "a.txt", "x", "add a");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let workflow = squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        true,
    );
    let console = CaptureConsole::answering(true);

    let effects = workflow.run(None, &console).unwrap();
    assert_eq!(effects.len(), 1);

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(count_commits(&remote, tip.as_str()), 1);

    // The tree is exactly {a.txt: "x"}.
    let files = dest.run(&["ls-tree", "--name-only", "-r", tip.as_str()]).unwrap();
    assert_eq!(files.trim(), "a.txt");
    let content = dest
        .run(&["cat-file", "blob", &format!("{tip}:a.txt")])
        .unwrap();
    assert_eq!(content, "x");

    // The message ends with the origin label naming C1.
    let message = dest.commit_message(tip.as_str()).unwrap();
    let last_line = message.trim_end().lines().next_back().unwrap();
    assert_eq!(last_line, format!("TestOrigin-RevId: {c1}"));
}

#[test]
fn baseline_after_run_is_latest_origin_revision() {
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");
    let head = commit_file(&origin_repo, origin_dir.path(), "b.txt", "two", "second");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let workflow = squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        true,
    );
    let console = CaptureConsole::answering(true);
    workflow.run(None, &console).unwrap();

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    let labels = trailer_values(&remote, tip.as_str(), "TestOrigin-RevId");
    assert_eq!(labels, vec![head.to_string()]);
    // Two origin changes squashed into one destination commit.
    assert_eq!(count_commits(&remote, tip.as_str()), 1);
}

#[test]
fn rerun_with_unchanged_origin_is_empty_change() {
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "x", "add a");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        Arc::clone(&cache),
        true,
    )
    .run(None, &console)
    .unwrap();

    // Second run without force: the baseline equals the head, nothing new.
    let err = squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        false,
    )
    .run(None, &console)
    .unwrap_err();
    assert!(err.is_empty_change(), "got: {err}");

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(count_commits(&remote, tip.as_str()), 1, "no new commit");
}

#[test]
fn incremental_squash_migrates_only_new_changes() {
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        Arc::clone(&cache),
        true,
    )
    .run(None, &console)
    .unwrap();

    let c2 = commit_file(&origin_repo, origin_dir.path(), "a.txt", "two", "update a");
    squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        false,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(count_commits(&remote, tip.as_str()), 2);
    let labels = trailer_values(&remote, tip.as_str(), "TestOrigin-RevId");
    assert_eq!(labels, vec![c2.to_string()]);
    let content = dest
        .run(&["cat-file", "blob", &format!("{tip}:a.txt")])
        .unwrap();
    assert_eq!(content, "two");
}
