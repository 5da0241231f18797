//! A single origin change, as enumerated by a reader.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use ferry_git::GitOid;

use super::author::Author;
use super::labels::{self, LabelSet};
use super::revision::Revision;

/// One change in origin history: the revision plus the metadata the
/// executor and writers need. Created by readers, never mutated.
#[derive(Clone, Debug)]
pub struct Change {
    revision: Revision,
    parents: Vec<GitOid>,
    author: Author,
    committer: Author,
    timestamp: DateTime<FixedOffset>,
    message: String,
    /// Files touched, when the reader asked for them. `None` means the
    /// reader did not enumerate files (not the same as an empty tree).
    files: Option<Vec<PathBuf>>,
    is_merge: bool,
}

impl Change {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        revision: Revision,
        parents: Vec<GitOid>,
        author: Author,
        committer: Author,
        timestamp: DateTime<FixedOffset>,
        message: String,
        files: Option<Vec<PathBuf>>,
        is_merge: bool,
    ) -> Self {
        Self {
            revision,
            parents,
            author,
            committer,
            timestamp,
            message,
            files,
            is_merge,
        }
    }

    #[must_use]
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    #[must_use]
    pub fn id(&self) -> &GitOid {
        self.revision.id()
    }

    #[must_use]
    pub fn parents(&self) -> &[GitOid] {
        &self.parents
    }

    #[must_use]
    pub fn author(&self) -> &Author {
        &self.author
    }

    #[must_use]
    pub fn committer(&self) -> &Author {
        &self.committer
    }

    #[must_use]
    pub fn timestamp(&self) -> &DateTime<FixedOffset> {
        &self.timestamp
    }

    /// The full message body.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The first line of the message.
    #[must_use]
    pub fn first_line(&self) -> &str {
        labels::summary(&self.message)
    }

    #[must_use]
    pub fn files(&self) -> Option<&[PathBuf]> {
        self.files.as_deref()
    }

    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.is_merge
    }

    /// Labels parsed from the trailing label block, duplicates preserved.
    /// Derived on demand; the message itself stays authoritative.
    #[must_use]
    pub fn labels(&self) -> LabelSet {
        labels::trailer_block(&self.message)
    }

    /// A copy of this change with `block` appended to its message (used to
    /// inline merged branch-commit logs).
    #[must_use]
    pub fn with_appended_message(mut self, block: &str) -> Self {
        let body = self.message.trim_end_matches('\n');
        self.message = format!("{body}\n\n{block}");
        self
    }
}
