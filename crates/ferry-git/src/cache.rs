//! Bare-repo cache keyed by remote URL.
//!
//! Fetching the same remote repeatedly across workflows is the dominant cost
//! of a migration run, so each remote URL gets one bare repository under a
//! configurable cache root, initialized on first demand and reused for the
//! process lifetime. Mutations are serialized per repo by an advisory file
//! lock, so two ferry processes sharing a cache root cannot interleave a
//! fetch and a push on the same repo.
//!
//! Cache layout:
//!
//! ```text
//! <root>/
//! ├── example_com_repo-6f1d2ac39b01/        ← bare repo (sanitized url + digest)
//! ├── example_com_repo-6f1d2ac39b01.lock    ← advisory lock file
//! └── ...
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::env::GitEnv;
use crate::error::GitError;
use crate::repo::{FetchOptions, GitRepo};

/// Git config key controlling the partial-clone filter of the cache remote.
const PARTIAL_FILTER_KEY: &str = "remote.origin.partialclonefilter";

/// A cache of bare repositories, one per remote URL.
#[derive(Debug)]
pub struct RepoCache {
    root: PathBuf,
    env: GitEnv,
}

impl RepoCache {
    /// Open (creating if needed) a cache rooted at `root`.
    ///
    /// # Errors
    /// Fails when the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>, env: GitEnv) -> Result<Self, GitError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, env })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The bare repo for `url`, initialized on first demand.
    ///
    /// # Errors
    /// Propagates init failures; holding the lock during init keeps two
    /// processes from initializing the same directory.
    pub fn repo_for(&self, url: &str) -> Result<CachedRepo, GitError> {
        let dir = self.root.join(dir_name(url));
        let lock_path = dir.with_extension("lock");
        let cached = CachedRepo {
            repo: GitRepo::bare(&dir, self.env.clone()),
            url: url.to_owned(),
            lock_path,
        };

        if !dir.join("HEAD").exists() {
            let _lock = cached.lock()?;
            // Re-check under the lock: another process may have won the race.
            if !dir.join("HEAD").exists() {
                debug!(url, dir = %dir.display(), "initializing cache repo");
                GitRepo::init_bare(&dir, self.env.clone())?;
                cached.repo.config_set("remote.origin.url", url)?;
            }
        }
        Ok(cached)
    }
}

/// One URL's bare repository plus its lock file.
#[derive(Debug)]
pub struct CachedRepo {
    repo: GitRepo,
    url: String,
    lock_path: PathBuf,
}

impl CachedRepo {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    /// Take the exclusive advisory lock; blocks until available. The lock is
    /// released when the returned guard drops.
    ///
    /// # Errors
    /// Fails when the lock file cannot be created or locked.
    pub fn lock(&self) -> Result<CacheLock, GitError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(CacheLock { file })
    }

    /// Fetch `refspecs` from the cached remote, serialized by the repo lock.
    ///
    /// # Errors
    /// Classified like [`GitRepo::fetch`].
    pub fn fetch(&self, refspecs: &[String], opts: &FetchOptions) -> Result<(), GitError> {
        let _lock = self.lock()?;
        self.repo.fetch("origin", refspecs, opts)
    }

    /// Toggle the partial-clone blob filter for subsequent fetches.
    ///
    /// # Errors
    /// [`GitError::Command`] when git config fails.
    pub fn set_partial_fetch(&self, enabled: bool) -> Result<(), GitError> {
        if enabled {
            self.repo.config_set(PARTIAL_FILTER_KEY, "blob:none")
        } else {
            self.repo.config_unset(PARTIAL_FILTER_KEY)
        }
    }
}

/// Guard for the per-repo advisory lock.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Directory name for a remote URL: a readable sanitized tail plus a stable
/// content digest, so distinct URLs never collide.
fn dir_name(url: &str) -> String {
    let sanitized: String = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .chars()
        .rev()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let digest = Sha256::digest(url.as_bytes());
    let mut hex = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("{}-{hex}", sanitized.trim_start_matches('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dir_names_are_stable_and_distinct() {
        let a1 = dir_name("https://example.com/org/repo.git");
        let a2 = dir_name("https://example.com/org/repo.git");
        let b = dir_name("https://example.com/org/other.git");
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(!a1.contains('/'));
        assert!(!a1.contains(':'));
    }

    #[test]
    fn urls_with_same_tail_do_not_collide() {
        let a = dir_name("https://host-one.com/repo");
        let b = dir_name("https://host-two.com/repo");
        assert_ne!(a, b);
    }

    #[test]
    fn repo_for_initializes_once() {
        let root = TempDir::new().unwrap();
        let cache = RepoCache::new(root.path(), GitEnv::new()).unwrap();

        let first = cache.repo_for("https://example.com/org/repo.git").unwrap();
        assert!(first.repo().git_dir().join("HEAD").exists());

        // Second request reuses the same directory.
        let second = cache.repo_for("https://example.com/org/repo.git").unwrap();
        assert_eq!(first.repo().git_dir(), second.repo().git_dir());
    }

    #[test]
    fn partial_fetch_toggle_roundtrips() {
        let root = TempDir::new().unwrap();
        let cache = RepoCache::new(root.path(), GitEnv::new()).unwrap();
        let repo = cache.repo_for("https://example.com/x.git").unwrap();

        repo.set_partial_fetch(true).unwrap();
        let value = repo
            .repo()
            .run(&["config", "--get", PARTIAL_FILTER_KEY])
            .unwrap();
        assert_eq!(value.trim(), "blob:none");

        repo.set_partial_fetch(false).unwrap();
        assert!(repo.repo().run(&["config", "--get", PARTIAL_FILTER_KEY]).is_err());

        // Unsetting twice stays fine.
        repo.set_partial_fetch(false).unwrap();
    }

    #[test]
    fn lock_is_reentrant_across_guards() {
        let root = TempDir::new().unwrap();
        let cache = RepoCache::new(root.path(), GitEnv::new()).unwrap();
        let repo = cache.repo_for("https://example.com/lock.git").unwrap();
        drop(repo.lock().unwrap());
        drop(repo.lock().unwrap());
    }
}
