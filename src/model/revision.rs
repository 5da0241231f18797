//! Immutable revision identifiers.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset};
use ferry_git::GitOid;

use super::author::Author;
use super::labels::LabelSet;

/// A resolved origin revision: a commit id plus the context it was resolved
/// in. Immutable once issued; two revisions are equal iff their ids are.
#[derive(Clone, Debug)]
pub struct Revision {
    id: GitOid,
    url: Option<String>,
    context_ref: Option<String>,
    timestamp: Option<DateTime<FixedOffset>>,
    author: Option<Author>,
    labels: LabelSet,
}

impl Revision {
    #[must_use]
    pub fn new(id: GitOid) -> Self {
        Self {
            id,
            url: None,
            context_ref: None,
            timestamp: None,
            author: None,
            labels: LabelSet::new(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Record the human-named ref this revision was resolved from.
    #[must_use]
    pub fn with_context_ref(mut self, context_ref: impl Into<String>) -> Self {
        self.context_ref = Some(context_ref.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    #[must_use]
    pub fn id(&self) -> &GitOid {
        &self.id
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn context_ref(&self) -> Option<&str> {
        self.context_ref.as_deref()
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        self.timestamp.as_ref()
    }

    #[must_use]
    pub fn author(&self) -> Option<&Author> {
        self.author.as_ref()
    }

    #[must_use]
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Revision {}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context_ref {
            Some(context) => write!(f, "{} ({context})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
