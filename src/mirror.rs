//! Repo-to-repo mirroring: a named, linear sequence of scriptable actions
//! over the plumbing layer.
//!
//! A mirror declares its refspecs up front; every refspec an action touches
//! must be covered by the declared set, checked before any I/O happens.
//! Actions run in declared order; the first failure stops the job unless
//! `--force`, which records every failure and reports them all at the end.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ferry_git::{FetchOptions, FfPolicy, GitOid, GitRepo, PushOptions, Refspec, RepoCache};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::api::CodeReviewApi;
use crate::console::Console;
use crate::error::FerryError;

// ---------------------------------------------------------------------------
// MirrorAction
// ---------------------------------------------------------------------------

/// One step of a mirror job.
pub trait MirrorAction {
    fn name(&self) -> &str;

    /// Run against the mirror context. Failure is reported either by
    /// returning an error or by calling [`MirrorContext::error`].
    ///
    /// # Errors
    /// Any [`FerryError`].
    fn run(&self, ctx: &mut MirrorContext<'_>) -> Result<(), FerryError>;
}

/// An action backed by a closure.
pub struct FnAction {
    name: String,
    body: Box<dyn Fn(&mut MirrorContext<'_>) -> Result<(), FerryError>>,
}

impl FnAction {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&mut MirrorContext<'_>) -> Result<(), FerryError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl MirrorAction for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut MirrorContext<'_>) -> Result<(), FerryError> {
        (self.body)(ctx)
    }
}

/// The default action when a mirror declares none: fetch every declared
/// refspec from the origin, then push the mapped refs to the destination.
struct DefaultAction;

impl MirrorAction for DefaultAction {
    fn name(&self) -> &str {
        "default-mirror"
    }

    fn run(&self, ctx: &mut MirrorContext<'_>) -> Result<(), FerryError> {
        let fetch: Vec<String> = ctx.declared.iter().map(ToString::to_string).collect();
        ctx.origin_fetch(&fetch)?;
        let push: Vec<String> = ctx
            .declared
            .iter()
            .map(|spec| {
                let mut identity = format!("{0}:{0}", spec.destination);
                if spec.force {
                    identity.insert(0, '+');
                }
                identity
            })
            .collect();
        ctx.destination_push(&push, &[])
    }
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

/// A named mirror job between two repositories.
pub struct Mirror {
    name: String,
    origin_url: String,
    destination_url: String,
    declared: Vec<Refspec>,
    actions: Vec<Box<dyn MirrorAction>>,
    cache: Arc<RepoCache>,
    origin_api: Option<Arc<dyn CodeReviewApi>>,
    destination_api: Option<Arc<dyn CodeReviewApi>>,
    force: bool,
    cancel: Arc<AtomicBool>,
}

impl Mirror {
    /// Create a mirror job.
    ///
    /// # Errors
    /// [`FerryError::Validation`] on a malformed declared refspec.
    pub fn new(
        name: impl Into<String>,
        cache: Arc<RepoCache>,
        origin_url: impl Into<String>,
        destination_url: impl Into<String>,
        refspecs: &[String],
    ) -> Result<Self, FerryError> {
        let declared = refspecs
            .iter()
            .map(|spec| Refspec::parse(spec).map_err(|e| FerryError::git("parsing mirror refspec", e)))
            .collect::<Result<Vec<_>, _>>()?;
        if declared.is_empty() {
            return Err(FerryError::validation(
                "a mirror needs at least one refspec",
            ));
        }
        Ok(Self {
            name: name.into(),
            origin_url: origin_url.into(),
            destination_url: destination_url.into(),
            declared,
            actions: Vec::new(),
            cache,
            origin_api: None,
            destination_api: None,
            force: false,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn action(mut self, action: Box<dyn MirrorAction>) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn origin_api(mut self, api: Arc<dyn CodeReviewApi>) -> Self {
        self.origin_api = Some(api);
        self
    }

    #[must_use]
    pub fn destination_api(mut self, api: Arc<dyn CodeReviewApi>) -> Self {
        self.destination_api = Some(api);
        self
    }

    /// Record per-action failures and keep going, reporting all at the end.
    #[must_use]
    pub const fn force(mut self, yes: bool) -> Self {
        self.force = yes;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cooperative cancellation flag, checked between actions.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run all actions in declared order.
    ///
    /// # Errors
    /// The first action failure, or (with `--force`) an aggregate error
    /// listing every failed action.
    pub fn run(&self, console: &dyn Console) -> Result<(), FerryError> {
        info!(mirror = %self.name, origin = %self.origin_url, destination = %self.destination_url, "starting mirror");
        // A dedicated store keyed away from origin readers, so mirror-only
        // refs never leak into migration history walks.
        let store_key = format!("{}#mirror", self.origin_url);
        let cached = self
            .cache
            .repo_for(&store_key)
            .map_err(|e| FerryError::git("opening mirror store", e))?;
        let _lock = cached
            .lock()
            .map_err(|e| FerryError::git("locking mirror store", e))?;

        let default_actions: Vec<Box<dyn MirrorAction>> = vec![Box::new(DefaultAction)];
        let actions = if self.actions.is_empty() {
            &default_actions
        } else {
            &self.actions
        };

        let mut failures: Vec<String> = Vec::new();
        for action in actions {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(FerryError::validation("mirror cancelled"));
            }
            let mut ctx = MirrorContext {
                repo: cached.repo().clone(),
                origin_url: &self.origin_url,
                destination_url: &self.destination_url,
                declared: &self.declared,
                origin_api: self.origin_api.clone(),
                destination_api: self.destination_api.clone(),
                console,
                outcome: None,
            };
            let result = action.run(&mut ctx);
            let failed = match (result, ctx.outcome) {
                (Err(err), _) => Some(err.to_string()),
                (Ok(()), Some(Err(message))) => Some(message),
                (Ok(()), _) => None,
            };
            if let Some(message) = failed {
                if self.force {
                    console.error(&format!("action '{}' failed: {message}", action.name()));
                    failures.push(format!("{}: {message}", action.name()));
                } else {
                    return Err(FerryError::validation(format!(
                        "mirror action '{}' failed: {message}",
                        action.name()
                    )));
                }
            } else {
                debug!(action = action.name(), "mirror action succeeded");
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FerryError::validation(format!(
                "{} mirror action(s) failed:\n  {}",
                failures.len(),
                failures.join("\n  ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// MirrorContext
// ---------------------------------------------------------------------------

/// What an action can do. Every refspec is validated against the mirror's
/// declared set before any I/O.
pub struct MirrorContext<'a> {
    repo: GitRepo,
    origin_url: &'a str,
    destination_url: &'a str,
    declared: &'a [Refspec],
    origin_api: Option<Arc<dyn CodeReviewApi>>,
    destination_api: Option<Arc<dyn CodeReviewApi>>,
    console: &'a dyn Console,
    outcome: Option<Result<(), String>>,
}

impl MirrorContext<'_> {
    /// Validate that each refspec stays inside the declared set. A refspec
    /// is allowed if a declared spec covers it, or if it is the identity
    /// mapping of a declared spec's destination side (the shape pushes and
    /// destination fetches use).
    fn validate_refspecs(&self, specs: &[String]) -> Result<Vec<Refspec>, FerryError> {
        let mut parsed = Vec::with_capacity(specs.len());
        for raw in specs {
            let spec = Refspec::parse(raw)
                .map_err(|e| FerryError::git("parsing action refspec", e))?;
            let allowed = self.declared.iter().any(|declared| {
                if declared.covers(&spec) {
                    return true;
                }
                let identity = Refspec {
                    force: true,
                    source: declared.destination.clone(),
                    destination: declared.destination.clone(),
                };
                identity.covers(&spec)
            });
            if !allowed {
                return Err(FerryError::validation(format!(
                    "refspec '{raw}' is not covered by the mirror's declared refspecs"
                )));
            }
            parsed.push(spec);
        }
        Ok(parsed)
    }

    /// Fetch `refspecs` from the origin into the mirror store.
    ///
    /// # Errors
    /// Validation errors for uncovered refspecs happen before any I/O.
    pub fn origin_fetch(&self, refspecs: &[String]) -> Result<(), FerryError> {
        self.validate_refspecs(refspecs)?;
        let forced: Vec<String> = refspecs.iter().map(|s| force_spec(s)).collect();
        self.repo
            .fetch(
                self.origin_url,
                &forced,
                &FetchOptions {
                    prune: true,
                    force: true,
                    depth: None,
                },
            )
            .map_err(|e| FerryError::git(format!("fetching {}", self.origin_url), e))
    }

    /// Fetch `refspecs` from the destination into the mirror store.
    ///
    /// # Errors
    /// Validation errors for uncovered refspecs happen before any I/O.
    pub fn destination_fetch(&self, refspecs: &[String]) -> Result<(), FerryError> {
        self.validate_refspecs(refspecs)?;
        let forced: Vec<String> = refspecs.iter().map(|s| force_spec(s)).collect();
        self.repo
            .fetch(
                self.destination_url,
                &forced,
                &FetchOptions {
                    force: true,
                    ..FetchOptions::default()
                },
            )
            .map_err(|e| FerryError::git(format!("fetching {}", self.destination_url), e))
    }

    /// Push `refspecs` from the mirror store to the destination.
    ///
    /// # Errors
    /// Validation errors for uncovered refspecs happen before any I/O.
    pub fn destination_push(
        &self,
        refspecs: &[String],
        push_options: &[String],
    ) -> Result<(), FerryError> {
        self.validate_refspecs(refspecs)?;
        self.repo
            .push(
                self.destination_url,
                refspecs,
                &PushOptions {
                    force: false,
                    push_options: push_options.to_vec(),
                    dry_run: false,
                },
            )
            .map_err(|e| FerryError::git(format!("pushing to {}", self.destination_url), e))
    }

    /// Create a branch in the mirror store.
    ///
    /// # Errors
    /// [`FerryError`] when git fails.
    pub fn create_branch(
        &self,
        name: &str,
        starting_point: Option<&str>,
    ) -> Result<(), FerryError> {
        self.repo
            .branch(name, starting_point)
            .map_err(|e| FerryError::git(format!("creating branch '{name}'"), e))
    }

    /// The refs currently in the mirror store, optionally filtered by a
    /// pattern.
    ///
    /// # Errors
    /// [`FerryError`] when git fails.
    pub fn references(
        &self,
        pattern: Option<&str>,
    ) -> Result<BTreeMap<String, GitOid>, FerryError> {
        self.repo
            .show_ref(pattern)
            .map_err(|e| FerryError::git("listing mirror refs", e))
    }

    /// Merge `commits` into `branch` in the mirror store.
    ///
    /// # Errors
    /// Conflicts surface as rebase-conflict errors.
    pub fn merge(
        &self,
        branch: &str,
        commits: &[String],
        policy: FfPolicy,
    ) -> Result<(), FerryError> {
        self.with_branch_worktree(branch, |scratch| {
            scratch.merge(commits, policy, None, None)
        })
    }

    /// Rebase `branch` onto `upstream` in the mirror store.
    ///
    /// # Errors
    /// Conflicts surface as rebase-conflict errors.
    pub fn rebase(&self, branch: &str, upstream: &str) -> Result<(), FerryError> {
        self.with_branch_worktree(branch, |scratch| scratch.rebase(upstream))
    }

    /// Cherry-pick `ranges` onto `branch`. Each picked commit records its
    /// source with the standard `(cherry picked from commit <sha>)` footer.
    ///
    /// # Errors
    /// Conflicts surface as rebase-conflict errors.
    pub fn cherry_pick(&self, branch: &str, ranges: &[String]) -> Result<(), FerryError> {
        self.with_branch_worktree(branch, |scratch| scratch.cherry_pick(ranges, true))
    }

    /// The origin's hosting API, when configured.
    #[must_use]
    pub fn origin_api(&self) -> Option<&Arc<dyn CodeReviewApi>> {
        self.origin_api.as_ref()
    }

    /// The destination's hosting API, when configured.
    #[must_use]
    pub fn destination_api(&self) -> Option<&Arc<dyn CodeReviewApi>> {
        self.destination_api.as_ref()
    }

    #[must_use]
    pub fn console(&self) -> &dyn Console {
        self.console
    }

    /// Mark this action as succeeded (the default when nothing is set).
    pub fn success(&mut self) {
        self.outcome = Some(Ok(()));
    }

    /// Mark this action as failed with `message`.
    pub fn error(&mut self, message: impl Into<String>) {
        self.outcome = Some(Err(message.into()));
    }

    /// Branch surgery needs a work-tree; the mirror store is bare. Run `op`
    /// in a scratch clone positioned on `branch`, then import the updated
    /// branch back into the store.
    fn with_branch_worktree(
        &self,
        branch: &str,
        op: impl FnOnce(&GitRepo) -> Result<(), ferry_git::GitError>,
    ) -> Result<(), FerryError> {
        let full = if branch.starts_with("refs/") {
            branch.to_owned()
        } else {
            format!("refs/heads/{branch}")
        };
        let scratch_dir = TempDir::new()?;
        let scratch = GitRepo::init(scratch_dir.path(), self.repo.env().clone())
            .map_err(|e| FerryError::git("initializing mirror work-tree", e))?;
        scratch
            .fetch(
                &self.repo.git_dir().display().to_string(),
                &["+refs/*:refs/*".to_owned()],
                &FetchOptions {
                    force: true,
                    ..FetchOptions::default()
                },
            )
            .map_err(|e| FerryError::git("staging mirror refs", e))?;
        scratch
            .force_checkout(&full)
            .map_err(|e| FerryError::git(format!("checking out '{branch}'"), e))?;
        op(&scratch).map_err(|e| FerryError::git(format!("rewriting '{branch}'"), e))?;
        // Detached HEAD holds the result; write it back to the branch.
        let tip = scratch
            .resolve_reference("HEAD")
            .map_err(|e| FerryError::git("resolving rewritten branch tip", e))?;
        self.repo
            .update_ref(&full, tip.as_str())
            .map_err(|e| FerryError::git(format!("updating '{branch}' in the mirror store"), e))
    }
}

fn force_spec(spec: &str) -> String {
    if spec.starts_with('+') {
        spec.to_owned()
    } else {
        format!("+{spec}")
    }
}
