//! Destination writers: publishing transformed trees as commits.
//!
//! A [`Destination`] hands out a [`Writer`] per workflow run. Writers compute
//! the last-migrated baseline from destination history, build commits from a
//! [`TransformResult`], and push — returning a sequence of
//! [`DestinationEffect`] records describing what happened.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use ferry_git::GitOid;

use crate::console::Console;
use crate::error::FerryError;
use crate::model::{Author, Change, Glob, LabelSet, Revision};

pub mod git;
pub mod review;

pub use git::GitDestination;
pub use review::{GerritDestination, PullRequestDestination};

// ---------------------------------------------------------------------------
// WriterContext
// ---------------------------------------------------------------------------

/// Context shared by every write of one workflow run.
#[derive(Clone, Debug)]
pub struct WriterContext {
    pub workflow_name: String,
    /// Stable identity used to derive feature branch names and Change-Ids.
    pub workflow_identity_user: String,
    pub dry_run: bool,
    /// The origin-side context ref the run was resolved from, when known.
    pub origin_ref: Option<String>,
    /// Root prefixes of interest (from the origin glob).
    pub roots: Vec<String>,
}

impl WriterContext {
    #[must_use]
    pub fn new(workflow_name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            workflow_identity_user: identity.into(),
            dry_run: false,
            origin_ref: None,
            roots: Vec::new(),
        }
    }

    #[must_use]
    pub const fn dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }

    #[must_use]
    pub fn origin_ref(mut self, reference: impl Into<String>) -> Self {
        self.origin_ref = Some(reference.into());
        self
    }

    #[must_use]
    pub fn roots(mut self, roots: Vec<String>) -> Self {
        self.roots = roots;
        self
    }
}

// ---------------------------------------------------------------------------
// TransformResult
// ---------------------------------------------------------------------------

/// The transformed tree plus the metadata a writer needs to publish it.
#[derive(Clone, Debug)]
pub struct TransformResult {
    /// Directory holding the transformed tree.
    pub workdir: PathBuf,
    /// The origin revision this tree was produced from.
    pub current_revision: Revision,
    /// The revision the user asked for (before walking individual changes).
    pub requested_revision: Revision,
    pub author: Author,
    pub timestamp: DateTime<FixedOffset>,
    /// Commit message for the destination commit.
    pub summary: String,
    /// Destination commit sha to stage onto (change-request mode).
    pub baseline: Option<String>,
    /// The origin changes this result covers (newest last).
    pub changes: Vec<Change>,
    /// Extra labels to append after the summary (e.g. folded noop revs).
    pub labels: LabelSet,
    /// The label name recording the origin revision.
    pub rev_id_label: String,
    /// Whether to record the origin revision label at all.
    pub set_rev_id: bool,
    /// The raw ref string the run was invoked with, when any.
    pub raw_source_ref: Option<String>,
}

impl TransformResult {
    #[must_use]
    pub fn new(
        workdir: PathBuf,
        current_revision: Revision,
        author: Author,
        timestamp: DateTime<FixedOffset>,
        summary: impl Into<String>,
        rev_id_label: impl Into<String>,
    ) -> Self {
        Self {
            workdir,
            requested_revision: current_revision.clone(),
            current_revision,
            author,
            timestamp,
            summary: summary.into(),
            baseline: None,
            changes: Vec::new(),
            labels: LabelSet::new(),
            rev_id_label: rev_id_label.into(),
            set_rev_id: true,
            raw_source_ref: None,
        }
    }

    #[must_use]
    pub fn baseline(mut self, baseline: impl Into<String>) -> Self {
        self.baseline = Some(baseline.into());
        self
    }

    #[must_use]
    pub fn changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    #[must_use]
    pub fn labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    #[must_use]
    pub const fn set_rev_id(mut self, yes: bool) -> Self {
        self.set_rev_id = yes;
        self
    }

    #[must_use]
    pub fn requested_revision(mut self, revision: Revision) -> Self {
        self.requested_revision = revision;
        self
    }

    #[must_use]
    pub fn raw_source_ref(mut self, reference: impl Into<String>) -> Self {
        self.raw_source_ref = Some(reference.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Effects and status
// ---------------------------------------------------------------------------

/// What a write did to the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    Created,
    Updated,
    Noop,
    Error,
}

/// One record of a destination mutation (or non-mutation).
#[derive(Clone, Debug)]
pub struct DestinationEffect {
    pub kind: EffectKind,
    /// Human-readable description of what happened.
    pub description: String,
    /// The destination reference: commit sha, PR/MR number, or review id.
    pub reference: Option<String>,
}

impl DestinationEffect {
    #[must_use]
    pub fn new(kind: EffectKind, description: impl Into<String>, reference: Option<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            reference,
        }
    }
}

/// The last-migrated state recovered from destination history.
#[derive(Clone, Debug)]
pub struct DestinationStatus {
    /// The value of the origin label on the newest labeled commit — i.e.
    /// the origin revision last migrated.
    pub baseline: String,
    /// Destination commits above the baseline commit, newest first.
    pub pending_changes: Vec<GitOid>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Write-side capability surface of a destination.
pub trait Writer {
    /// Scan destination history for the newest commit labeled `label` under
    /// the push ref. `None` when the destination has no migrated commit.
    fn destination_status(
        &self,
        glob: &Glob,
        label: &str,
    ) -> Result<Option<DestinationStatus>, FerryError>;

    /// Find the destination commit whose trailer carries `label: value`,
    /// scanning from the push ref. Used by change-request mode to map an
    /// origin baseline onto a destination commit. Writers without history
    /// report `None`.
    fn resolve_baseline(
        &self,
        glob: &Glob,
        label: &str,
        value: &str,
    ) -> Result<Option<GitOid>, FerryError> {
        let _ = (glob, label, value);
        Ok(None)
    }

    /// Publish a transform result, respecting `glob` as the set of paths the
    /// migration owns in the destination.
    fn write(
        &self,
        transform: &TransformResult,
        glob: &Glob,
        console: &dyn Console,
    ) -> Result<Vec<DestinationEffect>, FerryError>;
}

/// A destination repository: hands out one writer per run.
pub trait Destination {
    /// Create a writer for one workflow run.
    fn writer(&self, ctx: &WriterContext) -> Result<Box<dyn Writer>, FerryError>;
}
