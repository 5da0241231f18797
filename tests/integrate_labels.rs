//! Integrate-label end-to-end: fake merges and file inclusion at publish
//! time.

mod common;

use std::sync::Arc;

use ferry::console::CaptureConsole;
use ferry::destination::GitDestination;
use ferry::integrate::{INTEGRATE_LABEL, IntegrateResolver, Strategy};
use ferry::model::Author;
use ferry::origin::GitOrigin;
use ferry::workflow::{Workflow, WorkflowMode};
use ferry_git::RepoCache;

use common::*;

fn committer() -> Author {
    Author::new("Carl Committer", "carl@example.com")
}

fn workflow_with_integrate(
    origin_url: String,
    dest_url: String,
    cache: Arc<RepoCache>,
    strategy: Strategy,
) -> Workflow {
    let origin = GitOrigin::new(Arc::clone(&cache), origin_url, "HEAD").label("TestOrigin-RevId");
    let dest = GitDestination::new(cache, dest_url, "main", "main", committer())
        .force(true)
        .integrate(IntegrateResolver::new(strategy));
    Workflow::new("default", WorkflowMode::Squash, Box::new(origin), Box::new(dest)).force(true)
}

/// A feature repo with branch `feature1` whose tip adds `feature.txt`.
fn setup_feature_repo() -> (tempfile::TempDir, ferry_git::GitOid) {
    let (dir, repo) = setup_repo();
    commit_file(&repo, dir.path(), "base.txt", "base", "base commit");
    repo.branch("feature1", None).unwrap();
    repo.force_checkout("feature1").unwrap();
    let tip = commit_file(&repo, dir.path(), "feature.txt", "from feature", "feature work");
    (dir, tip)
}

#[test]
fn fake_merge_creates_two_parent_commit() {
    let (feature_dir, feature_tip) = setup_feature_repo();

    let (origin_dir, origin_repo) = setup_repo();
    let label_line = format!(
        "{INTEGRATE_LABEL}={} feature1",
        feature_dir.path().display()
    );
    let t = commit_file_with_message(
        &origin_repo,
        origin_dir.path(),
        "a.txt",
        "x",
        &format!("integrate the feature\n\n{label_line}\n"),
    );

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    workflow_with_integrate(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        Strategy::FakeMerge,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    let parents = dest.commit_parents(tip.as_str()).unwrap();
    assert_eq!(parents.len(), 2, "fake merge has exactly two parents");
    // First parent: the migration commit; second: the referenced sha.
    assert_eq!(parents[1], feature_tip);
    let first_parent_msg = dest.commit_message(parents[0].as_str()).unwrap();
    assert!(first_parent_msg.contains("integrate the feature"));

    // Merge message: "Merge of <F>" plus the origin label.
    let message = dest.commit_message(tip.as_str()).unwrap();
    assert!(message.starts_with(&format!("Merge of {feature_tip}")));
    assert_eq!(
        trailer_values(&remote, tip.as_str(), "TestOrigin-RevId"),
        vec![t.to_string()]
    );

    // The fake merge keeps the migrated tree: no feature.txt.
    let files = dest
        .run(&["ls-tree", "--name-only", "-r", tip.as_str()])
        .unwrap();
    assert!(files.contains("a.txt"));
    assert!(!files.contains("feature.txt"));
}

#[test]
fn include_files_copies_feature_diff_without_merge() {
    let (feature_dir, _feature_tip) = setup_feature_repo();

    let (origin_dir, origin_repo) = setup_repo();
    let label_line = format!(
        "{INTEGRATE_LABEL}={} feature1",
        feature_dir.path().display()
    );
    commit_file_with_message(
        &origin_repo,
        origin_dir.path(),
        "a.txt",
        "x",
        &format!("integrate files\n\n{label_line}\n"),
    );

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    workflow_with_integrate(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        Strategy::IncludeFiles,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    // No merge commit: a single parentless import.
    assert!(dest.commit_parents(tip.as_str()).unwrap().is_empty());
    let files = dest
        .run(&["ls-tree", "--name-only", "-r", tip.as_str()])
        .unwrap();
    assert!(files.contains("a.txt"));
    assert!(files.contains("feature.txt"), "feature file included: {files}");
}

#[test]
fn fake_merge_and_include_files_takes_both() {
    let (feature_dir, feature_tip) = setup_feature_repo();

    let (origin_dir, origin_repo) = setup_repo();
    let label_line = format!(
        "{INTEGRATE_LABEL}={} feature1",
        feature_dir.path().display()
    );
    commit_file_with_message(
        &origin_repo,
        origin_dir.path(),
        "a.txt",
        "x",
        &format!("integrate everything\n\n{label_line}\n"),
    );

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    workflow_with_integrate(
        origin_dir.path().display().to_string(),
        remote.path().display().to_string(),
        cache,
        Strategy::FakeMergeAndIncludeFiles,
    )
    .run(None, &console)
    .unwrap();

    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    let parents = dest.commit_parents(tip.as_str()).unwrap();
    assert_eq!(parents.len(), 2);
    assert_eq!(parents[1], feature_tip);
    let files = dest
        .run(&["ls-tree", "--name-only", "-r", tip.as_str()])
        .unwrap();
    assert!(files.contains("feature.txt"), "feature file in merge tree: {files}");
}

#[test]
fn ignore_errors_skips_unreachable_feature_repo() {
    let (origin_dir, origin_repo) = setup_repo();
    commit_file_with_message(
        &origin_repo,
        origin_dir.path(),
        "a.txt",
        "x",
        &format!("integrate gone repo\n\n{INTEGRATE_LABEL}=/no/such/repo feature1\n"),
    );

    let remote = setup_bare();
    let (_cache_dir, cache) = setup_cache();
    let console = CaptureConsole::answering(true);

    let origin = GitOrigin::new(
        Arc::clone(&cache),
        origin_dir.path().display().to_string(),
        "HEAD",
    )
    .label("TestOrigin-RevId");
    let dest = GitDestination::new(
        Arc::clone(&cache),
        remote.path().display().to_string(),
        "main",
        "main",
        committer(),
    )
    .force(true)
    .integrate(IntegrateResolver::new(Strategy::FakeMerge).ignore_errors(true));
    let workflow = Workflow::new(
        "default",
        WorkflowMode::Squash,
        Box::new(origin),
        Box::new(dest),
    )
    .force(true);

    workflow.run(None, &console).unwrap();

    // The migration landed as a plain commit; the label was a no-op.
    let dest = open_bare(&remote);
    let tip = dest.resolve_reference("refs/heads/main").unwrap();
    assert!(dest.commit_parents(tip.as_str()).unwrap().is_empty());
    assert!(console.contains(
        ferry::console::Severity::Warn,
        "could not integrate"
    ));
}
