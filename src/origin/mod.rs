//! Origin readers: resolving references, enumerating changes, walking
//! history.
//!
//! An [`Origin`] produces a [`Reader`] parameterized by the glob of
//! interesting paths. Readers create [`Change`]s and [`Revision`]s and never
//! mutate them.

use std::path::Path;

use crate::error::FerryError;
use crate::model::{Change, Revision};

pub mod folder;
pub mod git;

pub use folder::FolderOrigin;
pub use git::GitOrigin;

/// Why an enumeration of changes came back empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyReason {
    /// `to` is an ancestor of `from`: the destination is already ahead.
    ToIsAncestor,
    /// Changes exist, but none touch a path in the requested roots.
    NoChangesInRoots,
    /// `from` and `to` share no history.
    UnrelatedRevisions,
}

/// Result of [`Reader::changes`]: a non-empty oldest-first list, or a tagged
/// empty response.
#[derive(Debug)]
pub enum ChangesResponse {
    /// At least one change, oldest first.
    Changes(Vec<Change>),
    /// No changes, with the reason.
    Empty(EmptyReason),
}

impl ChangesResponse {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }

    /// The changes, or `None` for an empty response.
    #[must_use]
    pub fn changes(&self) -> Option<&[Change]> {
        match self {
            Self::Changes(changes) => Some(changes),
            Self::Empty(_) => None,
        }
    }

    /// Consume into the change list, or `None` for an empty response.
    #[must_use]
    pub fn into_changes(self) -> Option<Vec<Change>> {
        match self {
            Self::Changes(changes) => Some(changes),
            Self::Empty(_) => None,
        }
    }
}

/// Visitor protocol for [`Reader::visit_changes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Keep walking.
    Continue,
    /// Stop the walk; not an error.
    Terminate,
}

/// A visitor over history, newest first.
pub type ChangeVisitor<'a> = dyn FnMut(&Change) -> Result<VisitOutcome, FerryError> + 'a;

/// Read-side capability surface of an origin.
pub trait Reader {
    /// Resolve a reference (branch, tag, sha1, ...) to a concrete revision.
    fn resolve(&self, reference: &str) -> Result<Revision, FerryError>;

    /// Enumerate changes in `(from, to]`, oldest first, honoring the
    /// reader's path filter.
    fn changes(
        &self,
        from: Option<&Revision>,
        to: &Revision,
    ) -> Result<ChangesResponse, FerryError>;

    /// A single change, including labels parsed from its message.
    fn change(&self, rev: &Revision) -> Result<Change, FerryError>;

    /// Walk history from `start` in reverse-chronological order, paging in
    /// batches, until the visitor terminates or history runs out.
    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut ChangeVisitor<'_>,
    ) -> Result<(), FerryError>;

    /// Candidate baseline revisions for change-request mode when the origin
    /// carries no explicit baseline label: first-parent ancestors of `start`
    /// (exclusive) not carrying `label`, newest first.
    fn find_baselines_without_label(
        &self,
        start: &Revision,
        label: &str,
        limit: usize,
    ) -> Result<Vec<Revision>, FerryError>;

    /// Materialize the tree of `rev` into `workdir`.
    fn checkout(&self, rev: &Revision, workdir: &Path) -> Result<(), FerryError>;
}

/// An origin repository: hands out readers and names its revision label.
pub trait Origin {
    /// The label recording migrated revisions in destination commits,
    /// e.g. `GitOrigin-RevId`.
    fn label_name(&self) -> &str;

    /// A reader filtered to `origin_files`.
    fn reader(&self, origin_files: &crate::model::Glob) -> Result<Box<dyn Reader>, FerryError>;
}
