//! Failure taxonomy for the git plumbing layer.
//!
//! Every operation in this crate fails with [`GitError`]. Variants map onto
//! the four error kinds the engine distinguishes:
//!
//! - `Command` / `Timeout` — repo-kind failures (git exited non-zero, not
//!   otherwise classifiable),
//! - `Transient` — network-shaped failures, safe to retry with backoff,
//! - `Validation` / `CannotResolveRevision` — user-caused, never retried,
//! - `RebaseConflict` / `NonFastForward` — always surfaced to the caller
//!   unresolved.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A list of conflicting paths, formatted one per comma-separated entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathList(pub Vec<PathBuf>);

impl fmt::Display for PathList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for p in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.display())?;
            first = false;
        }
        Ok(())
    }
}

/// Errors from the git plumbing layer.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git exited non-zero and the failure is not otherwise classifiable.
    #[error("`{command}` failed{}: {stderr}", exit_label(.exit_code))]
    Command {
        /// The command that was run, e.g. `"git fetch origin main"`.
        command: String,
        /// Trimmed stderr from git.
        stderr: String,
        /// Process exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// The subprocess exceeded its deadline and was killed.
    #[error("`{command}` timed out after {seconds}s and was killed")]
    Timeout {
        /// The command that was run.
        command: String,
        /// The deadline that was exceeded.
        seconds: u64,
    },

    /// Network-shaped failure (unreachable host, reset connection, 5xx from
    /// a smart-HTTP server). Retriable with bounded backoff.
    #[error("transient failure running `{command}`: {stderr}")]
    Transient {
        /// The command that was run.
        command: String,
        /// Trimmed stderr from git.
        stderr: String,
    },

    /// User-caused: malformed refspec, bad configuration, invalid input.
    #[error("{0}")]
    Validation(String),

    /// A reference could not be resolved to a commit.
    #[error("cannot resolve revision '{reference}': {detail}")]
    CannotResolveRevision {
        /// The reference that was requested.
        reference: String,
        /// Why it could not be resolved (from git stderr, or "not a commit").
        detail: String,
    },

    /// A rebase, merge, or cherry-pick stopped on conflicting paths.
    #[error("{operation} produced conflicts in: {paths}")]
    RebaseConflict {
        /// The operation that conflicted (`"rebase"`, `"merge"`, ...).
        operation: String,
        /// Paths left in a conflicted state, as reported by git.
        paths: PathList,
    },

    /// The remote rejected a push because local history is behind.
    #[error("push rejected (non-fast-forward) for '{refspec}': fetch and retry")]
    NonFastForward {
        /// The refspec the remote rejected.
        refspec: String,
    },

    /// An I/O error spawning or talking to the git process.
    #[error("I/O error running git: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" (exit code {c})"),
        None => String::new(),
    }
}

impl GitError {
    /// Whether this failure is safe to retry with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a failed `git fetch`/`git push`/`git ls-remote` by stderr.
    ///
    /// Network-shaped messages become [`GitError::Transient`]; auth failures
    /// and bad refspecs are permanent and become [`GitError::Validation`];
    /// everything else stays a plain [`GitError::Command`].
    #[must_use]
    pub fn classify_remote(command: String, stderr: String, exit_code: Option<i32>) -> Self {
        const TRANSIENT_MARKERS: [&str; 8] = [
            "Could not resolve host",
            "Connection refused",
            "Connection reset",
            "Connection timed out",
            "Operation timed out",
            "early EOF",
            "RPC failed",
            "The requested URL returned error: 5",
        ];
        const PERMANENT_MARKERS: [&str; 5] = [
            "Authentication failed",
            "could not read Username",
            "could not read Password",
            "invalid refspec",
            "Permission denied",
        ];

        if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Self::Transient { command, stderr };
        }
        if PERMANENT_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Self::Validation(format!("`{command}` failed: {stderr}"));
        }
        Self::Command {
            command,
            stderr,
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let err = GitError::classify_remote(
            "git fetch origin".to_owned(),
            "fatal: unable to access 'x': Could not resolve host: example.com".to_owned(),
            Some(128),
        );
        assert!(err.is_transient());
    }

    #[test]
    fn auth_failure_is_permanent() {
        let err = GitError::classify_remote(
            "git push origin main".to_owned(),
            "fatal: Authentication failed for 'https://example.com/'".to_owned(),
            Some(128),
        );
        assert!(matches!(err, GitError::Validation(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn unclassified_stays_command() {
        let err = GitError::classify_remote(
            "git fetch origin".to_owned(),
            "fatal: bad object HEAD".to_owned(),
            Some(128),
        );
        assert!(matches!(err, GitError::Command { .. }));
    }

    #[test]
    fn command_display_includes_exit_code() {
        let err = GitError::Command {
            command: "git log".to_owned(),
            stderr: "fatal: bad revision".to_owned(),
            exit_code: Some(128),
        };
        let msg = format!("{err}");
        assert!(msg.contains("git log"));
        assert!(msg.contains("128"));
        assert!(msg.contains("bad revision"));
    }

    #[test]
    fn conflict_display_lists_paths() {
        let err = GitError::RebaseConflict {
            operation: "rebase".to_owned(),
            paths: PathList(vec![PathBuf::from("a.txt"), PathBuf::from("b/c.txt")]),
        };
        let msg = format!("{err}");
        assert!(msg.contains("a.txt"));
        assert!(msg.contains("b/c.txt"));
    }
}
