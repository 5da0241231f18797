//! Shared helpers for ferry integration tests.
//!
//! All tests run against throwaway git repositories in temp directories by
//! spawning the real `git` binary — no side effects outside the tempdirs.

// Not every test file uses every helper.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use ferry_git::{CommitRequest, FetchOptions, GitEnv, GitOid, GitRepo, PushOptions, RepoCache};
use tempfile::TempDir;

/// Deterministic identities for every repo the tests touch.
pub fn test_env() -> GitEnv {
    GitEnv::new()
        .with("GIT_AUTHOR_NAME", "Ann Author")
        .with("GIT_AUTHOR_EMAIL", "ann@example.com")
        .with("GIT_COMMITTER_NAME", "Carl Committer")
        .with("GIT_COMMITTER_EMAIL", "carl@example.com")
}

/// A fresh repo with a work-tree, identity configured.
pub fn setup_repo() -> (TempDir, GitRepo) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo = GitRepo::init(dir.path(), test_env()).expect("git init failed");
    (dir, repo)
}

/// A fresh bare repo, for use as a push target.
pub fn setup_bare() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    GitRepo::init_bare(dir.path(), test_env()).expect("git init --bare failed");
    dir
}

/// A fresh bare-repo cache.
pub fn setup_cache() -> (TempDir, Arc<RepoCache>) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let cache = RepoCache::new(dir.path(), test_env()).expect("cache init failed");
    (dir, Arc::new(cache))
}

/// Write `content` to `rel` inside the work-tree and commit everything.
pub fn commit_file(repo: &GitRepo, dir: &Path, rel: &str, content: &str, message: &str) -> GitOid {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir failed");
    }
    std::fs::write(&path, content).expect("write failed");
    repo.add_all().expect("git add failed");
    repo.commit(&CommitRequest::new(format!("{message}\n")))
        .expect("git commit failed")
}

/// Commit with a full custom message (for label-carrying commits).
pub fn commit_file_with_message(
    repo: &GitRepo,
    dir: &Path,
    rel: &str,
    content: &str,
    full_message: &str,
) -> GitOid {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir failed");
    }
    std::fs::write(&path, content).expect("write failed");
    repo.add_all().expect("git add failed");
    repo.commit(&CommitRequest::new(full_message.to_owned()))
        .expect("git commit failed")
}

/// Open a handle on a bare remote for assertions.
pub fn open_bare(dir: &TempDir) -> GitRepo {
    GitRepo::bare(dir.path(), test_env())
}

/// Commit a file directly onto `refs/heads/<branch>` of a bare remote,
/// bypassing ferry (simulates out-of-band destination activity).
pub fn commit_to_remote(remote: &TempDir, branch: &str, rel: &str, content: &str, message: &str) -> GitOid {
    let scratch_dir = TempDir::new().expect("failed to create temp dir");
    let scratch = GitRepo::init(scratch_dir.path(), test_env()).expect("git init failed");
    let url = remote.path().display().to_string();
    let full = format!("refs/heads/{branch}");

    // Branch may not exist yet on the remote; start fresh if so.
    let fetched = scratch.fetch(
        &url,
        &[format!("+{full}:{full}")],
        &FetchOptions {
            force: true,
            ..FetchOptions::default()
        },
    );
    if fetched.is_ok() {
        scratch.force_checkout(&full).expect("checkout failed");
    }

    let oid = commit_file(&scratch, scratch_dir.path(), rel, content, message);
    scratch
        .push(
            &url,
            &[format!("{oid}:{full}")],
            &PushOptions {
                force: true,
                ..PushOptions::default()
            },
        )
        .expect("push failed");
    oid
}

/// All `name: value` occurrences of `name` in the trailer of `rev`'s
/// message on the remote.
pub fn trailer_values(remote: &TempDir, rev: &str, name: &str) -> Vec<String> {
    let repo = open_bare(remote);
    let message = repo.commit_message(rev).expect("commit_message failed");
    message
        .lines()
        .filter_map(|line| {
            let (n, v) = line.split_once(": ")?;
            (n == name).then(|| v.to_owned())
        })
        .collect()
}

/// Number of commits reachable from `rev` on the remote.
pub fn count_commits(remote: &TempDir, rev: &str) -> usize {
    let repo = open_bare(remote);
    let out = repo
        .run(&["rev-list", "--count", rev])
        .expect("rev-list failed");
    out.trim().parse().expect("unparseable commit count")
}
