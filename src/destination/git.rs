//! Git destination: publishes transformed trees as commits on a push ref.

use std::path::PathBuf;
use std::sync::Arc;

use ferry_git::{CommitRequest, FetchOptions, GitError, GitRepo, LogRequest, PushOptions, RepoCache};
use tracing::{debug, info};

use crate::console::Console;
use crate::destination::{
    Destination, DestinationEffect, DestinationStatus, EffectKind, TransformResult, Writer,
    WriterContext,
};
use crate::error::FerryError;
use crate::integrate::IntegrateResolver;
use crate::model::{Author, Glob, labels};
use crate::workdir;

/// Local ref the destination tip is staged under in scratch repos.
const DEST_REF: &str = "refs/ferry/dest";

/// Page size for baseline scans of destination history.
const STATUS_PAGE: usize = 200;

/// Qualify a branch name as a full ref; full refs pass through.
fn full_ref(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_owned()
    } else {
        format!("refs/heads/{name}")
    }
}

/// Whether a fetch failure means "the remote exists but lacks this ref".
fn is_missing_remote_ref(err: &GitError) -> bool {
    matches!(err, GitError::Command { stderr, .. } if stderr.contains("couldn't find remote ref"))
}

// ---------------------------------------------------------------------------
// GitDestination
// ---------------------------------------------------------------------------

/// A git repository acting as migration destination.
#[derive(Clone, Debug)]
pub struct GitDestination {
    cache: Arc<RepoCache>,
    url: String,
    fetch_ref: String,
    push_ref: String,
    committer: Author,
    push_options: Vec<String>,
    ask_confirmation: bool,
    allow_empty: bool,
    force: bool,
    skip_push: bool,
    local_repo_path: Option<PathBuf>,
    integrate: Option<IntegrateResolver>,
}

impl GitDestination {
    #[must_use]
    pub fn new(
        cache: Arc<RepoCache>,
        url: impl Into<String>,
        fetch_ref: impl Into<String>,
        push_ref: impl Into<String>,
        committer: Author,
    ) -> Self {
        Self {
            cache,
            url: url.into(),
            fetch_ref: fetch_ref.into(),
            push_ref: push_ref.into(),
            committer,
            push_options: Vec::new(),
            ask_confirmation: false,
            allow_empty: false,
            force: false,
            skip_push: false,
            local_repo_path: None,
            integrate: None,
        }
    }

    #[must_use]
    pub fn push_options(mut self, options: Vec<String>) -> Self {
        self.push_options = options;
        self
    }

    /// Show the staged result and block on a yes/no before any push.
    #[must_use]
    pub const fn ask_confirmation(mut self, yes: bool) -> Self {
        self.ask_confirmation = yes;
        self
    }

    /// Permit commits with no difference against the baseline.
    #[must_use]
    pub const fn allow_empty(mut self, yes: bool) -> Self {
        self.allow_empty = yes;
        self
    }

    /// Initialize a missing destination ref instead of failing, and
    /// force-push.
    #[must_use]
    pub const fn force(mut self, yes: bool) -> Self {
        self.force = yes;
        self
    }

    /// Commit locally but never push to the remote.
    #[must_use]
    pub const fn skip_push(mut self, yes: bool) -> Self {
        self.skip_push = yes;
        self
    }

    /// Deliver commits into a local repository instead of the remote; a
    /// later push from outside is expected to deliver them.
    #[must_use]
    pub fn local_repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_repo_path = Some(path.into());
        self
    }

    /// Resolve integrate labels with this resolver before pushing.
    #[must_use]
    pub fn integrate(mut self, resolver: IntegrateResolver) -> Self {
        self.integrate = Some(resolver);
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn push_ref(&self) -> &str {
        &self.push_ref
    }

    pub(crate) fn writer_for(&self, ctx: &WriterContext) -> GitWriter {
        GitWriter {
            dest: self.clone(),
            dry_run: ctx.dry_run,
        }
    }
}

impl Destination for GitDestination {
    fn writer(&self, ctx: &WriterContext) -> Result<Box<dyn Writer>, FerryError> {
        Ok(Box::new(self.writer_for(ctx)))
    }
}

// ---------------------------------------------------------------------------
// GitWriter
// ---------------------------------------------------------------------------

/// One run's writer over a [`GitDestination`].
pub struct GitWriter {
    dest: GitDestination,
    dry_run: bool,
}

impl GitWriter {
    /// Build the scratch repository holding the destination checkout.
    fn prepare_scratch(
        &self,
        scratch_dir: &std::path::Path,
        baseline: Option<&str>,
    ) -> Result<(GitRepo, bool), FerryError> {
        let dest = &self.dest;
        let cached = dest
            .cache
            .repo_for(&dest.url)
            .map_err(|e| FerryError::git(format!("opening cache repo for {}", dest.url), e))?;
        let fetch_ref = full_ref(&dest.fetch_ref);

        let mut have_dest = true;
        let fetched = cached.repo().fetch(
            "origin",
            &[format!("+{fetch_ref}:{fetch_ref}")],
            &FetchOptions {
                force: true,
                ..FetchOptions::default()
            },
        );
        if let Err(err) = fetched {
            if is_missing_remote_ref(&err) {
                if dest.force {
                    info!(url = %dest.url, "destination ref missing; starting an empty history");
                    have_dest = false;
                } else {
                    return Err(FerryError::git(
                        format!(
                            "destination ref '{}' not found in {} (use --force for a first migration)",
                            dest.fetch_ref, dest.url
                        ),
                        err,
                    ));
                }
            } else {
                return Err(FerryError::git(format!("fetching {}", dest.url), err));
            }
        }

        let mut scratch = GitRepo::init(scratch_dir, cached.repo().env().clone())
            .map_err(|e| FerryError::git("initializing destination work-tree", e))?;
        scratch
            .env_mut()
            .set("GIT_COMMITTER_NAME", &dest.committer.name)
            .set("GIT_COMMITTER_EMAIL", &dest.committer.email);
        scratch
            .config_set("commit.gpgsign", "false")
            .map_err(|e| FerryError::git("configuring destination work-tree", e))?;

        if have_dest {
            scratch
                .fetch(
                    &cached.repo().git_dir().display().to_string(),
                    &[format!("+{fetch_ref}:{DEST_REF}")],
                    &FetchOptions {
                        force: true,
                        ..FetchOptions::default()
                    },
                )
                .map_err(|e| FerryError::git("staging destination history", e))?;
            let checkout_point = baseline.unwrap_or(DEST_REF);
            scratch.force_checkout(checkout_point).map_err(|e| {
                if baseline.is_some() {
                    FerryError::validation(format!(
                        "baseline '{checkout_point}' not found in {}: {e}",
                        dest.url
                    ))
                } else {
                    FerryError::git(format!("checking out {checkout_point}"), e)
                }
            })?;
        }
        Ok((scratch, have_dest))
    }

    fn assemble_message(&self, transform: &TransformResult) -> String {
        let mut message = transform.summary.clone();
        for label in &transform.labels {
            message = labels::append_label(&message, &label.name, &label.value);
        }
        if transform.set_rev_id {
            message = labels::append_label(
                &message,
                &transform.rev_id_label,
                transform.current_revision.id().as_str(),
            );
        }
        message
    }
}

impl Writer for GitWriter {
    fn destination_status(
        &self,
        _glob: &Glob,
        label: &str,
    ) -> Result<Option<DestinationStatus>, FerryError> {
        let dest = &self.dest;
        let cached = dest
            .cache
            .repo_for(&dest.url)
            .map_err(|e| FerryError::git(format!("opening cache repo for {}", dest.url), e))?;
        let fetch_ref = full_ref(&dest.fetch_ref);

        let fetched = cached.fetch(
            &[format!("+{fetch_ref}:{DEST_REF}")],
            &FetchOptions {
                force: true,
                ..FetchOptions::default()
            },
        );
        if let Err(err) = fetched {
            if is_missing_remote_ref(&err) {
                return Ok(None);
            }
            return Err(FerryError::git(format!("fetching {}", dest.url), err));
        }

        let mut pending = Vec::new();
        let mut skip = 0;
        loop {
            let entries = cached
                .repo()
                .log(&LogRequest::new(DEST_REF).limit(STATUS_PAGE).skip(skip))
                .map_err(|e| FerryError::git("scanning destination history", e))?;
            if entries.is_empty() {
                return Ok(None);
            }
            for entry in &entries {
                if let Some(value) = labels::trailer_block(&entry.body).last(label) {
                    debug!(commit = %entry.commit, baseline = value, "found destination baseline");
                    return Ok(Some(DestinationStatus {
                        baseline: value.to_owned(),
                        pending_changes: pending,
                    }));
                }
                pending.push(entry.commit.clone());
            }
            skip += entries.len();
        }
    }

    fn resolve_baseline(
        &self,
        _glob: &Glob,
        label: &str,
        value: &str,
    ) -> Result<Option<ferry_git::GitOid>, FerryError> {
        let dest = &self.dest;
        let cached = dest
            .cache
            .repo_for(&dest.url)
            .map_err(|e| FerryError::git(format!("opening cache repo for {}", dest.url), e))?;
        let fetch_ref = full_ref(&dest.fetch_ref);
        let fetched = cached.fetch(
            &[format!("+{fetch_ref}:{DEST_REF}")],
            &FetchOptions {
                force: true,
                ..FetchOptions::default()
            },
        );
        if let Err(err) = fetched {
            if is_missing_remote_ref(&err) {
                return Ok(None);
            }
            return Err(FerryError::git(format!("fetching {}", dest.url), err));
        }
        let mut skip = 0;
        loop {
            let entries = cached
                .repo()
                .log(&LogRequest::new(DEST_REF).limit(STATUS_PAGE).skip(skip))
                .map_err(|e| FerryError::git("scanning destination history", e))?;
            if entries.is_empty() {
                return Ok(None);
            }
            for entry in &entries {
                if labels::trailer_block(&entry.body)
                    .last(label)
                    .is_some_and(|v| v == value)
                {
                    return Ok(Some(entry.commit.clone()));
                }
            }
            skip += entries.len();
        }
    }

    fn write(
        &self,
        transform: &TransformResult,
        glob: &Glob,
        console: &dyn Console,
    ) -> Result<Vec<DestinationEffect>, FerryError> {
        let dest = &self.dest;
        let cached = dest
            .cache
            .repo_for(&dest.url)
            .map_err(|e| FerryError::git(format!("opening cache repo for {}", dest.url), e))?;
        // One writer owns the repo for the whole fetch-and-push span.
        let _lock = cached
            .lock()
            .map_err(|e| FerryError::git(format!("locking cache repo for {}", dest.url), e))?;
        drop(cached);

        let scratch_dir = tempfile::TempDir::new()?;
        let (scratch, have_dest) =
            self.prepare_scratch(scratch_dir.path(), transform.baseline.as_deref())?;

        // Replace the slice of the destination this migration owns.
        if have_dest {
            workdir::remove_matching(scratch_dir.path(), glob)?;
        }
        workdir::copy_tree(&transform.workdir, scratch_dir.path(), glob)?;

        if let Some(resolver) = &dest.integrate {
            resolver.apply_includes(&scratch, &transform.summary, console)?;
        }

        scratch
            .add_all()
            .map_err(|e| FerryError::git("staging destination changes", e))?;
        let empty = scratch
            .staged_is_empty()
            .map_err(|e| FerryError::git("checking staged changes", e))?;
        if empty && transform.baseline.is_none() && !dest.allow_empty {
            return Err(FerryError::empty(format!(
                "origin revision {} produced no difference against {}",
                transform.current_revision.id(),
                dest.url
            )));
        }

        let message = self.assemble_message(transform);
        let commit = scratch
            .commit(&CommitRequest {
                message,
                author: Some((transform.author.name.clone(), transform.author.email.clone())),
                author_date: Some(transform.timestamp.to_rfc3339()),
                amend: false,
                allow_empty: empty,
            })
            .map_err(|e| FerryError::git("committing to destination work-tree", e))?;
        let mut tip = commit;

        if transform.baseline.is_some() && have_dest {
            scratch
                .rebase(DEST_REF)
                .map_err(|e| FerryError::git(format!("rebasing onto {}", dest.push_ref), e))?;
            tip = scratch
                .resolve_reference("HEAD")
                .map_err(|e| FerryError::git("resolving rebased tip", e))?;
        }

        if let Some(resolver) = &dest.integrate {
            let trailer: Vec<(String, String)> = if transform.set_rev_id {
                vec![(
                    transform.rev_id_label.clone(),
                    transform.current_revision.id().to_string(),
                )]
            } else {
                Vec::new()
            };
            tip = resolver.apply_merges(&scratch, &transform.summary, &trailer, console)?;
        }

        if dest.ask_confirmation {
            let staged = scratch
                .run(&["show", "--stat", tip.as_str()])
                .map_err(|e| FerryError::git("rendering the staged result", e))?;
            console.info(&staged);
            let push_to = full_ref(&dest.push_ref);
            if !console.prompt_confirm(&format!("Push to {} {push_to}?", dest.url))? {
                return Err(FerryError::validation(
                    "user aborted the migration at the confirmation prompt",
                ));
            }
        }

        let push_ref = full_ref(&dest.push_ref);
        let refspec = format!("{tip}:{push_ref}");

        if self.dry_run {
            console.info(&format!(
                "dry-run: skipping push of {tip} to {} {push_ref}",
                dest.url
            ));
            return Ok(vec![DestinationEffect::new(
                EffectKind::Created,
                format!("commit {tip} created (dry-run, not pushed)"),
                Some(tip.to_string()),
            )]);
        }

        if let Some(local) = &dest.local_repo_path {
            if !local.join("HEAD").exists() {
                GitRepo::init_bare(local, scratch.env().clone())
                    .map_err(|e| FerryError::git("initializing the local delivery repo", e))?;
            }
            scratch
                .push(
                    &local.display().to_string(),
                    &[refspec],
                    &PushOptions {
                        force: true,
                        ..PushOptions::default()
                    },
                )
                .map_err(|e| FerryError::git("delivering to the local repo", e))?;
            return Ok(vec![DestinationEffect::new(
                EffectKind::Created,
                format!("commit {tip} delivered to {}", local.display()),
                Some(tip.to_string()),
            )]);
        }

        if dest.skip_push {
            console.info(&format!("skip-push: commit {tip} left unpushed"));
            return Ok(vec![DestinationEffect::new(
                EffectKind::Created,
                format!("commit {tip} created (push skipped)"),
                Some(tip.to_string()),
            )]);
        }

        scratch
            .push(
                &dest.url,
                &[refspec],
                &PushOptions {
                    force: dest.force,
                    push_options: dest.push_options.clone(),
                    dry_run: false,
                },
            )
            .map_err(|e| FerryError::git(format!("pushing to {} {push_ref}", dest.url), e))?;
        info!(url = %dest.url, %tip, push_ref = %push_ref, "pushed migration commit");

        Ok(vec![DestinationEffect::new(
            EffectKind::Created,
            format!("created commit {tip} on {}", dest.push_ref),
            Some(tip.to_string()),
        )])
    }
}
