//! Engine error types.
//!
//! Defines [`FerryError`], the unified error for migration operations. Each
//! variant maps to one of four kinds — validation, repo, transient, internal
//! — which drive retry policy and the process exit code. Messages include
//! actionable guidance where the remediation is deterministic.

use std::fmt;

use ferry_git::GitError;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// The coarse classification used for retry policy and exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-caused. Aborts the workflow, never retried. Exit code 1.
    Validation,
    /// Git-level failure (process failures, conflicts, rejected pushes).
    /// Aborts unless `--force`. Exit code 2.
    Repo,
    /// Network-shaped. Retried with bounded backoff. Exit code 3.
    Transient,
    /// A bug or an unclassifiable condition. Exit code 4.
    Internal,
}

impl ErrorKind {
    /// The process exit code for this kind.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Validation => 1,
            Self::Repo => 2,
            Self::Transient => 3,
            Self::Internal => 4,
        }
    }
}

// ---------------------------------------------------------------------------
// FerryError
// ---------------------------------------------------------------------------

/// Unified error type for migration operations.
#[derive(Debug)]
pub enum FerryError {
    /// Bad config, invalid reference, malformed label, or a user abort.
    Validation {
        /// What went wrong, phrased for the person running the migration.
        message: String,
    },

    /// The migration produced no change against the destination baseline.
    ///
    /// A subtype of validation: by default it aborts the run, but callers
    /// may downgrade it to a NOOP effect.
    EmptyChange {
        /// Which revision (or range) turned out empty, and why.
        message: String,
    },

    /// An open change request already carries exactly this diff.
    ///
    /// A subtype of [`FerryError::EmptyChange`] raised only by
    /// pull/merge-request writers.
    RedundantChange {
        /// The existing change request (PR/MR number or review id).
        reference: String,
        /// Why the update was considered redundant.
        message: String,
    },

    /// A plumbing failure, enriched with migration context.
    Git {
        /// What the engine was doing (repo url, ref, operation).
        context: String,
        /// The underlying plumbing error.
        source: GitError,
    },

    /// An I/O error outside git (workdir copying, temp dirs).
    Io(std::io::Error),

    /// A condition that indicates a bug in ferry itself.
    Internal {
        /// Description of the impossible state.
        message: String,
    },
}

impl FerryError {
    /// Convenience constructor for validation errors.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Convenience constructor for empty-change errors.
    pub fn empty(message: impl Into<String>) -> Self {
        Self::EmptyChange {
            message: message.into(),
        }
    }

    /// Wrap a plumbing error with migration context.
    pub fn git(context: impl Into<String>, source: GitError) -> Self {
        Self::Git {
            context: context.into(),
            source,
        }
    }

    /// The coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::EmptyChange { .. } | Self::RedundantChange { .. } => {
                ErrorKind::Validation
            }
            Self::Git { source, .. } => match source {
                GitError::Transient { .. } => ErrorKind::Transient,
                GitError::Validation(_) | GitError::CannotResolveRevision { .. } => {
                    ErrorKind::Validation
                }
                _ => ErrorKind::Repo,
            },
            Self::Io(_) | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this failure is safe to retry with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether this is an empty-change condition (including redundant
    /// change requests), which some call sites downgrade to a NOOP.
    #[must_use]
    pub const fn is_empty_change(&self) -> bool {
        matches!(
            self,
            Self::EmptyChange { .. } | Self::RedundantChange { .. }
        )
    }
}

impl fmt::Display for FerryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "{message}"),
            Self::EmptyChange { message } => {
                write!(f, "empty change: {message}")
            }
            Self::RedundantChange { reference, message } => {
                write!(
                    f,
                    "change request {reference} is already up to date: {message}"
                )
            }
            Self::Git { context, source } => {
                write!(f, "{context}: {source}")?;
                match source {
                    GitError::Transient { .. } => {
                        write!(f, "\n  This looks network-related; retrying may help.")
                    }
                    GitError::NonFastForward { .. } => write!(
                        f,
                        "\n  The destination moved underneath this run; re-run to pick up the new tip."
                    ),
                    GitError::RebaseConflict { .. } => write!(
                        f,
                        "\n  Resolve the conflicting paths in the origin change and re-run."
                    ),
                    _ => Ok(()),
                }
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for FerryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FerryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<GitError> for FerryError {
    fn from(source: GitError) -> Self {
        Self::Git {
            context: "git operation failed".to_owned(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_exit_codes() {
        assert_eq!(ErrorKind::Validation.exit_code(), 1);
        assert_eq!(ErrorKind::Repo.exit_code(), 2);
        assert_eq!(ErrorKind::Transient.exit_code(), 3);
        assert_eq!(ErrorKind::Internal.exit_code(), 4);
    }

    #[test]
    fn empty_change_is_validation_kind() {
        let err = FerryError::empty("nothing to migrate for abc123");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.is_empty_change());
    }

    #[test]
    fn transient_git_error_is_retriable() {
        let err = FerryError::git(
            "fetching https://example.com/repo",
            GitError::Transient {
                command: "git fetch origin".to_owned(),
                stderr: "Could not resolve host".to_owned(),
            },
        );
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn cannot_resolve_is_validation() {
        let err = FerryError::git(
            "resolving origin ref",
            GitError::CannotResolveRevision {
                reference: "nope".to_owned(),
                detail: "unknown revision".to_owned(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn display_carries_context_and_cause() {
        let err = FerryError::git(
            "pushing to https://example.com/dest",
            GitError::NonFastForward {
                refspec: "refs/heads/main".to_owned(),
            },
        );
        let msg = format!("{err}");
        assert!(msg.contains("https://example.com/dest"));
        assert!(msg.contains("non-fast-forward"));
        assert!(msg.contains("re-run"));
    }

    #[test]
    fn redundant_change_display_names_reference() {
        let err = FerryError::RedundantChange {
            reference: "#42".to_owned(),
            message: "diff is empty and merge status is clean".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("#42"));
        assert!(msg.contains("up to date"));
    }
}
