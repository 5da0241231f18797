//! Workflow executor: deciding which origin changes to replay, in what
//! order, with what baseline.
//!
//! The three modes share one skeleton: compute the `(lastRev, currentRev]`
//! range, obtain an ordered list of candidate changes, run the transform
//! pipeline per change, and hand the result to the destination writer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tempfile::TempDir;
use tracing::info;

use crate::authoring::Authoring;
use crate::console::Console;
use crate::destination::{Destination, DestinationEffect, TransformResult, Writer, WriterContext};
use crate::error::FerryError;
use crate::model::{Glob, Revision};
use crate::origin::{Origin, Reader};
use crate::retry;
use crate::transform::{Identity, Transformation};

mod change_request;
mod iterative;
mod squash;

/// How many origin ancestors are tried as baseline candidates in
/// change-request mode.
const DEFAULT_BASELINE_SEARCH_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// WorkflowMode
// ---------------------------------------------------------------------------

/// Execution mode of a workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowMode {
    /// One destination commit covering the whole pending range.
    Squash,
    /// One destination commit per origin change.
    Iterative,
    /// One commit staged on a baseline and rebased onto the push ref,
    /// published as a change request.
    ChangeRequest,
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squash => write!(f, "SQUASH"),
            Self::Iterative => write!(f, "ITERATIVE"),
            Self::ChangeRequest => write!(f, "CHANGE_REQUEST"),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A configured migration pipeline: origin, transforms, destination.
pub struct Workflow {
    pub(crate) name: String,
    pub(crate) mode: WorkflowMode,
    pub(crate) origin: Box<dyn Origin>,
    pub(crate) destination: Box<dyn Destination>,
    pub(crate) transformation: Box<dyn Transformation>,
    pub(crate) authoring: Authoring,
    pub(crate) origin_files: Glob,
    pub(crate) destination_files: Glob,
    pub(crate) migrate_noop_changes: bool,
    pub(crate) set_rev_id: bool,
    pub(crate) force: bool,
    pub(crate) dry_run: bool,
    pub(crate) workflow_identity_user: String,
    pub(crate) baseline_search_limit: usize,
    cancel: Arc<AtomicBool>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        mode: WorkflowMode,
        origin: Box<dyn Origin>,
        destination: Box<dyn Destination>,
    ) -> Self {
        let name = name.into();
        let identity = format!("ferry/{name}");
        Self {
            name,
            mode,
            origin,
            destination,
            transformation: Box::new(Identity),
            authoring: Authoring::PassThru,
            origin_files: Glob::all_files(),
            destination_files: Glob::all_files(),
            migrate_noop_changes: false,
            set_rev_id: true,
            force: false,
            dry_run: false,
            workflow_identity_user: identity,
            baseline_search_limit: DEFAULT_BASELINE_SEARCH_LIMIT,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn transformation(mut self, transformation: Box<dyn Transformation>) -> Self {
        self.transformation = transformation;
        self
    }

    #[must_use]
    pub fn authoring(mut self, authoring: Authoring) -> Self {
        self.authoring = authoring;
        self
    }

    #[must_use]
    pub fn origin_files(mut self, glob: Glob) -> Self {
        self.origin_files = glob;
        self
    }

    #[must_use]
    pub fn destination_files(mut self, glob: Glob) -> Self {
        self.destination_files = glob;
        self
    }

    /// Migrate changes that produce no destination diff as explicit noops
    /// instead of folding their labels into the next non-empty commit.
    #[must_use]
    pub const fn migrate_noop_changes(mut self, yes: bool) -> Self {
        self.migrate_noop_changes = yes;
        self
    }

    /// Whether destination commits record the origin revision label.
    #[must_use]
    pub const fn set_rev_id(mut self, yes: bool) -> Self {
        self.set_rev_id = yes;
        self
    }

    #[must_use]
    pub const fn force(mut self, yes: bool) -> Self {
        self.force = yes;
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }

    #[must_use]
    pub fn workflow_identity_user(mut self, identity: impl Into<String>) -> Self {
        self.workflow_identity_user = identity.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mode(&self) -> WorkflowMode {
        self.mode
    }

    /// Cooperative cancellation flag: set it from a signal handler and the
    /// run stops before the next change or push.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), FerryError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(FerryError::validation("migration cancelled"))
        } else {
            Ok(())
        }
    }

    /// Run the workflow once against `source_ref` (or the origin's
    /// configured main ref).
    ///
    /// # Errors
    /// Any [`FerryError`]; empty-change conditions surface as
    /// [`FerryError::EmptyChange`].
    pub fn run(
        &self,
        source_ref: Option<&str>,
        console: &dyn Console,
    ) -> Result<Vec<DestinationEffect>, FerryError> {
        info!(workflow = %self.name, mode = %self.mode, "starting migration");
        let reader = self.origin.reader(&self.origin_files)?;
        let reference = source_ref.unwrap_or("");
        let requested = retry::with_backoff(
            "resolving the origin reference",
            retry::DEFAULT_ATTEMPTS,
            retry::DEFAULT_INITIAL_DELAY,
            || reader.resolve(reference),
        )?;
        console.info(&format!(
            "workflow '{}' ({}) migrating {requested}",
            self.name, self.mode
        ));

        let mut ctx = WriterContext::new(&self.name, &self.workflow_identity_user)
            .dry_run(self.dry_run)
            .roots(self.origin_files.roots());
        if let Some(context_ref) = requested.context_ref() {
            ctx = ctx.origin_ref(context_ref);
        }
        let writer = self.destination.writer(&ctx)?;

        match self.mode {
            WorkflowMode::Squash => {
                squash::run(self, reader.as_ref(), writer.as_ref(), &requested, source_ref, console)
            }
            WorkflowMode::Iterative => iterative::run(
                self,
                reader.as_ref(),
                writer.as_ref(),
                &requested,
                source_ref,
                console,
            ),
            WorkflowMode::ChangeRequest => change_request::run(
                self,
                reader.as_ref(),
                writer.as_ref(),
                &requested,
                source_ref,
                console,
            ),
        }
    }

    // -- shared helpers for the mode modules --

    /// The origin revision last migrated to the destination, recovered from
    /// the label on destination history.
    pub(crate) fn last_imported(
        &self,
        reader: &dyn Reader,
        writer: &dyn Writer,
    ) -> Result<Option<Revision>, FerryError> {
        let label = self.origin.label_name();
        let Some(status) = writer.destination_status(&self.destination_files, label)? else {
            return Ok(None);
        };
        let rev = reader.resolve(&status.baseline).map_err(|err| {
            FerryError::validation(format!(
                "destination baseline '{}' (from label {label}) cannot be resolved in the origin: {err}",
                status.baseline
            ))
        })?;
        Ok(Some(rev))
    }

    /// Materialize `rev` into a fresh workdir and run the transform
    /// pipeline over it.
    pub(crate) fn checkout_and_transform(
        &self,
        reader: &dyn Reader,
        rev: &Revision,
        console: &dyn Console,
    ) -> Result<TempDir, FerryError> {
        let workdir = TempDir::new()?;
        reader.checkout(rev, workdir.path())?;
        self.transformation.transform(workdir.path(), console)?;
        Ok(workdir)
    }

    /// Write with bounded retries on transient failures.
    pub(crate) fn write_with_retry(
        &self,
        writer: &dyn Writer,
        transform: &TransformResult,
        console: &dyn Console,
    ) -> Result<Vec<DestinationEffect>, FerryError> {
        self.check_cancelled()?;
        retry::with_backoff(
            "writing to the destination",
            retry::DEFAULT_ATTEMPTS,
            retry::DEFAULT_INITIAL_DELAY,
            || writer.write(transform, &self.destination_files, console),
        )
    }

    /// The timestamp to stamp on a destination commit when the origin
    /// carries none.
    pub(crate) fn fallback_timestamp() -> chrono::DateTime<chrono::FixedOffset> {
        Utc::now().fixed_offset()
    }
}
