//! Capability surface of the hosting APIs (GitHub, GitLab, Gerrit).
//!
//! The engine never talks HTTP itself; pull/merge-request writers and mirror
//! actions consume these traits. Production implementations live outside the
//! core; tests use scripted doubles.

use crate::error::FerryError;

pub mod gerrit;

/// An open pull/merge request on the hosting service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequest {
    /// PR/MR number (or Gerrit change number).
    pub number: u64,
    /// Web URL of the request.
    pub url: String,
    /// Opaque merge-status string as the service reports it (e.g. GitHub's
    /// `mergeable_state`). Compared against a configured allow-list only.
    pub mergeable_state: Option<String>,
}

/// Parameters for creating or updating a pull/merge request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullParams {
    pub title: String,
    pub body: String,
    /// Target branch of the request.
    pub base: String,
    /// Feature branch holding the migrated commits.
    pub head: String,
}

/// The subset of a code-review API the writers need.
pub trait CodeReviewApi {
    /// The open request whose head is `branch`, if any.
    ///
    /// # Errors
    /// [`FerryError`] with transient kind for network-shaped failures.
    fn find_pull(&self, branch: &str) -> Result<Option<PullRequest>, FerryError>;

    /// Open a new request.
    ///
    /// # Errors
    /// [`FerryError`] with transient kind for network-shaped failures.
    fn create_pull(&self, params: &PullParams) -> Result<PullRequest, FerryError>;

    /// Update an existing request in place.
    ///
    /// # Errors
    /// [`FerryError`] with transient kind for network-shaped failures.
    fn update_pull(&self, number: u64, params: &PullParams) -> Result<PullRequest, FerryError>;

    /// Delete a stale feature branch, where policy allows.
    ///
    /// # Errors
    /// [`FerryError`] with transient kind for network-shaped failures.
    fn delete_branch(&self, branch: &str) -> Result<(), FerryError>;
}
