//! CHANGE_REQUEST mode end-to-end: baseline resolution and rebase onto the
//! destination tip.

mod common;

use std::sync::Arc;

use ferry::console::CaptureConsole;
use ferry::destination::GitDestination;
use ferry::model::Author;
use ferry::origin::GitOrigin;
use ferry::workflow::{Workflow, WorkflowMode};
use ferry_git::{GitError, RepoCache};

use common::*;

fn committer() -> Author {
    Author::new("Carl Committer", "carl@example.com")
}

fn squash_workflow(origin_url: String, dest_url: String, cache: Arc<RepoCache>) -> Workflow {
    let origin = GitOrigin::new(Arc::clone(&cache), origin_url, "HEAD").label("TestOrigin-RevId");
    let dest =
        GitDestination::new(cache, dest_url, "main", "main", committer()).force(true);
    Workflow::new("seed", WorkflowMode::Squash, Box::new(origin), Box::new(dest)).force(true)
}

fn change_request_workflow(
    origin_url: String,
    dest_url: String,
    cache: Arc<RepoCache>,
) -> Workflow {
    let origin = GitOrigin::new(Arc::clone(&cache), origin_url, "HEAD").label("TestOrigin-RevId");
    // Change requests land on a feature branch, never on main directly.
    let dest = GitDestination::new(cache, dest_url, "main", "feature", committer());
    Workflow::new(
        "review",
        WorkflowMode::ChangeRequest,
        Box::new(origin),
        Box::new(dest),
    )
}

/// Seed: origin commit Ob migrated to the destination (commit B), then the
/// destination advances out-of-band to D.
fn seed(
) -> (tempfile::TempDir, ferry_git::GitRepo, tempfile::TempDir, Arc<RepoCache>, tempfile::TempDir)
{
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "base", "base change");

    let remote = setup_bare();
    let (cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);
    squash_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        Arc::clone(&cache),
    )
    .run(None, &console)
    .unwrap();

    (origin_dir, origin_repo, remote, cache, cache_dir)
}

#[test]
fn stages_on_baseline_and_rebases_onto_tip() {
    let (origin_dir, origin_repo, remote, cache, _cache_dir) = seed();

    // Destination advances: D touches an unrelated file.
    let d = commit_to_remote(&remote, "main", "d.txt", "destination work", "destination change");

    // Origin head H: the change under review.
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "reviewed", "the review");

    let console = CaptureConsole::answering(true);
    change_request_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let feature = dest.resolve_reference("refs/heads/feature").unwrap();
    // Conflict-free rebase: the feature tip's first parent is exactly D.
    let parents = dest.commit_parents(feature.as_str()).unwrap();
    assert_eq!(parents, vec![d.clone()]);

    // The staged tree carries both the review and the destination work.
    let files = dest
        .run(&["ls-tree", "--name-only", "-r", feature.as_str()])
        .unwrap();
    assert!(files.contains("a.txt"));
    assert!(files.contains("d.txt"));
    let content = dest
        .run(&["cat-file", "blob", &format!("{feature}:a.txt")])
        .unwrap();
    assert_eq!(content, "reviewed");

    // main itself is untouched.
    let main = dest.resolve_reference("refs/heads/main").unwrap();
    assert_eq!(main.as_str(), dest.resolve_reference(&d.to_string()).unwrap().as_str());
}

#[test]
fn rebase_conflict_aborts_without_pushing() {
    let (origin_dir, origin_repo, remote, cache, _cache_dir) = seed();

    // Destination rewrites a.txt; the review also rewrites a.txt.
    commit_to_remote(&remote, "main", "a.txt", "destination version", "conflicting change");
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "review version", "the review");

    let console = CaptureConsole::answering(true);
    let err = change_request_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
    )
    .run(None, &console)
    .unwrap_err();

    match err {
        ferry::FerryError::Git {
            source: GitError::RebaseConflict { paths, .. },
            ..
        } => {
            assert!(paths.0.iter().any(|p| p.to_str() == Some("a.txt")));
        }
        other => panic!("expected a rebase conflict, got {other}"),
    }

    // Nothing was pushed.
    let dest = open_bare(&remote);
    assert!(dest.resolve_reference("refs/heads/feature").is_err());
}

#[test]
fn missing_baseline_is_a_validation_error() {
    // A fresh destination with no migrated commit has no baseline to find.
    let (origin_dir, origin_repo) = setup_repo();
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "one", "first");
    commit_file(&origin_repo, origin_dir.path(), "a.txt", "two", "second");

    let remote = setup_bare();
    commit_to_remote(&remote, "main", "unrelated.txt", "x", "unrelated destination history");
    let (_cache_dir, cache) = setup_cache();

    let console = CaptureConsole::answering(true);
    let err = change_request_workflow(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
    )
    .run(None, &console)
    .unwrap_err();
    assert!(
        format!("{err}").contains("could not find a baseline"),
        "got: {err}"
    );
}
