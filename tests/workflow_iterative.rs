//! ITERATIVE mode end-to-end: per-change commits, noop folding, idempotence.

mod common;

use std::sync::Arc;

use ferry::console::CaptureConsole;
use ferry::destination::GitDestination;
use ferry::model::{Author, Glob};
use ferry::origin::GitOrigin;
use ferry::workflow::{Workflow, WorkflowMode};
use ferry_git::RepoCache;

use common::*;

fn committer() -> Author {
    Author::new("Carl Committer", "carl@example.com")
}

fn iterative_workflow(
    origin_url: String,
    dest_url: String,
    cache: Arc<RepoCache>,
    force: bool,
) -> Workflow {
    let origin = GitOrigin::new(Arc::clone(&cache), origin_url, "HEAD").label("TestOrigin-RevId");
    let dest = GitDestination::new(cache, dest_url, "main", "main", committer()).force(force);
    Workflow::new(
        "default",
        WorkflowMode::Iterative,
        Box::new(origin),
        Box::new(dest),
    )
    .force(force)
    // The destination owns everything except excluded/.
    .destination_files(Glob::new(&["**".to_owned()], &["excluded/**".to_owned()]).unwrap())
}

#[test]
fn one_destination_commit_per_origin_change() {
    let (origin_dir, origin_repo) = setup_repo();
    let c1 = commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");
    let c2 = commit_file(&origin_repo, origin_dir.path(), "b.txt", "two", "second");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    iterative_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        true,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(count_commits(&remote, tip.as_str()), 2);
    assert_eq!(
        trailer_values(&remote, tip.as_str(), "TestOrigin-RevId"),
        vec![c2.to_string()]
    );
    assert_eq!(
        trailer_values(&remote, &format!("{tip}~1"), "TestOrigin-RevId"),
        vec![c1.to_string()]
    );
}

#[test]
fn skipped_noop_change_folds_label_into_next_commit() {
    let (origin_dir, origin_repo) = setup_repo();
    let c1 = commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");
    // C2 touches only a path the destination does not own.
    let c2 = commit_file(
        &origin_repo,
        origin_dir.path(),
        "excluded/skip.txt",
        "hidden",
        "excluded only",
    );
    let c3 = commit_file(&origin_repo, origin_dir.path(), "a.txt", "three", "third");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    iterative_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        true,
    )
    .run(None, &console)
    .unwrap();

    // Exactly two destination commits: C1 and C3.
    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(count_commits(&remote, tip.as_str()), 2);
    assert_eq!(
        trailer_values(&remote, &format!("{tip}~1"), "TestOrigin-RevId"),
        vec![c1.to_string()]
    );

    // The C3 commit carries both its own label and the folded C2 label,
    // the newest one last.
    let labels = trailer_values(&remote, tip.as_str(), "TestOrigin-RevId");
    assert_eq!(labels, vec![c2.to_string(), c3.to_string()]);
}

#[test]
fn migrate_noop_changes_records_noop_effect() {
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");
    commit_file(
        &origin_repo,
        origin_dir.path(),
        "excluded/skip.txt",
        "hidden",
        "excluded only",
    );

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    let effects = iterative_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        true,
    )
    .migrate_noop_changes(true)
    .run(None, &console)
    .unwrap();

    let noops: Vec<_> = effects
        .iter()
        .filter(|e| e.kind == ferry::destination::EffectKind::Noop)
        .collect();
    assert_eq!(noops.len(), 1);

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(count_commits(&remote, tip.as_str()), 1);
}

#[test]
fn second_run_without_new_changes_writes_nothing() {
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");
    commit_file(&origin_repo, origin_dir.path(), "b.txt", "two", "second");

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    iterative_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        Arc::clone(&cache),
        true,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let tip_before = dest.resolve_reference("refs/heads/main").unwrap();

    let err = iterative_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        false,
    )
    .run(None, &console)
    .unwrap_err();
    assert!(err.is_empty_change(), "got: {err}");

    // Zero destination commits written: the tip is unchanged, so both runs
    // report the same baseline.
    let tip_after = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(tip_before, tip_after);
}
