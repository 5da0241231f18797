//! Git plumbing layer for ferry — a typed facade over the `git` binary.
//!
//! Operations address either a bare repository or a detached work-tree, run
//! in a sanitized environment with a wall-clock deadline, and return typed
//! values. The crate also provides the URL-keyed bare-repo cache shared by
//! all higher-level components, refspec parsing/coverage, and the
//! `git credential fill` driver.

pub mod cache;
pub mod credentials;
pub mod env;
pub mod error;
mod exec;
pub mod log;
pub mod oid;
pub mod refspec;
pub mod repo;

pub use cache::{CacheLock, CachedRepo, RepoCache};
pub use credentials::Credential;
pub use env::GitEnv;
pub use error::{GitError, PathList};
pub use log::{LogEntry, LogRequest, Signature};
pub use oid::GitOid;
pub use refspec::Refspec;
pub use repo::{
    CommitRequest, DEFAULT_SUBPROCESS_TIMEOUT, FetchOptions, FfPolicy, FileStatus, GitRepo,
    PushOptions,
};
