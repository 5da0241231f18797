//! Pull/merge-request and Gerrit writers, layered on the base git writer.
//!
//! The base writer stays unaware of any hosting API: it lands commits on a
//! feature branch (or a `refs/for/` magic ref) and exposes the commit sha.
//! The layers here call the hosting API afterwards to open or update the
//! review, and implement the redundant-change policy.

use std::sync::Arc;

use tracing::info;

use crate::api::{CodeReviewApi, PullParams, gerrit};
use crate::console::Console;
use crate::destination::git::{GitDestination, GitWriter};
use crate::destination::{
    Destination, DestinationEffect, DestinationStatus, EffectKind, TransformResult, Writer,
    WriterContext,
};
use crate::error::FerryError;
use crate::model::{Glob, labels};

/// Merge statuses under which an empty diff makes an existing request
/// redundant (vs. merely updated in place).
pub const DEFAULT_ALLOW_EMPTY_DIFF_MERGE_STATUSES: &[&str] = &["clean"];

// ---------------------------------------------------------------------------
// PullRequestDestination (GitHub / GitLab)
// ---------------------------------------------------------------------------

/// A destination that lands commits on a feature branch and opens or
/// updates a pull/merge request for it.
pub struct PullRequestDestination {
    base: GitDestination,
    api: Arc<dyn CodeReviewApi>,
    /// Target branch of the request.
    pr_base: String,
    /// Feature branch holding the migrated commits (the base writer's push
    /// ref).
    pr_branch: String,
    allow_empty_diff_merge_statuses: Vec<String>,
}

impl PullRequestDestination {
    #[must_use]
    pub fn new(
        base: GitDestination,
        api: Arc<dyn CodeReviewApi>,
        pr_base: impl Into<String>,
        pr_branch: impl Into<String>,
    ) -> Self {
        Self {
            base,
            api,
            pr_base: pr_base.into(),
            pr_branch: pr_branch.into(),
            allow_empty_diff_merge_statuses: DEFAULT_ALLOW_EMPTY_DIFF_MERGE_STATUSES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }

    /// Override the opaque merge-status allow-list.
    #[must_use]
    pub fn allow_empty_diff_merge_statuses(mut self, statuses: Vec<String>) -> Self {
        self.allow_empty_diff_merge_statuses = statuses;
        self
    }
}

impl Destination for PullRequestDestination {
    fn writer(&self, ctx: &WriterContext) -> Result<Box<dyn Writer>, FerryError> {
        Ok(Box::new(PullRequestWriter {
            inner: self.base.writer_for(ctx),
            api: Arc::clone(&self.api),
            pr_base: self.pr_base.clone(),
            pr_branch: self.pr_branch.clone(),
            allow_empty_diff_merge_statuses: self.allow_empty_diff_merge_statuses.clone(),
            dry_run: ctx.dry_run,
        }))
    }
}

struct PullRequestWriter {
    inner: GitWriter,
    api: Arc<dyn CodeReviewApi>,
    pr_base: String,
    pr_branch: String,
    allow_empty_diff_merge_statuses: Vec<String>,
    dry_run: bool,
}

impl PullRequestWriter {
    fn pull_params(transform: &TransformResult, pr_base: &str, pr_branch: &str) -> PullParams {
        PullParams {
            title: labels::summary(&transform.summary).to_owned(),
            body: transform.summary.clone(),
            base: pr_base.to_owned(),
            head: pr_branch.to_owned(),
        }
    }
}

impl Writer for PullRequestWriter {
    fn destination_status(
        &self,
        glob: &Glob,
        label: &str,
    ) -> Result<Option<DestinationStatus>, FerryError> {
        self.inner.destination_status(glob, label)
    }

    fn resolve_baseline(
        &self,
        glob: &Glob,
        label: &str,
        value: &str,
    ) -> Result<Option<ferry_git::GitOid>, FerryError> {
        self.inner.resolve_baseline(glob, label, value)
    }

    fn write(
        &self,
        transform: &TransformResult,
        glob: &Glob,
        console: &dyn Console,
    ) -> Result<Vec<DestinationEffect>, FerryError> {
        let existing = self.api.find_pull(&self.pr_branch)?;

        let mut effects = match self.inner.write(transform, glob, console) {
            Ok(effects) => effects,
            Err(err) if err.is_empty_change() => {
                let Some(pull) = existing else {
                    return Err(err);
                };
                let state_allows = pull
                    .mergeable_state
                    .as_deref()
                    .is_some_and(|s| {
                        self.allow_empty_diff_merge_statuses.iter().any(|a| a == s)
                    });
                if state_allows {
                    return Err(FerryError::RedundantChange {
                        reference: format!("#{}", pull.number),
                        message: format!(
                            "diff is empty and merge status '{}' allows skipping",
                            pull.mergeable_state.as_deref().unwrap_or_default()
                        ),
                    });
                }
                // Not mergeable-clean: refresh the request in place.
                let params = Self::pull_params(transform, &self.pr_base, &self.pr_branch);
                let updated = self.api.update_pull(pull.number, &params)?;
                return Ok(vec![DestinationEffect::new(
                    EffectKind::Updated,
                    format!("updated change request {}", updated.url),
                    Some(format!("#{}", updated.number)),
                )]);
            }
            Err(err) => return Err(err),
        };

        if self.dry_run {
            return Ok(effects);
        }

        let params = Self::pull_params(transform, &self.pr_base, &self.pr_branch);
        let effect = match existing {
            Some(pull) => {
                let updated = self.api.update_pull(pull.number, &params)?;
                info!(number = updated.number, "updated change request");
                DestinationEffect::new(
                    EffectKind::Updated,
                    format!("updated change request {}", updated.url),
                    Some(format!("#{}", updated.number)),
                )
            }
            None => {
                let created = self.api.create_pull(&params)?;
                info!(number = created.number, "created change request");
                DestinationEffect::new(
                    EffectKind::Created,
                    format!("created change request {}", created.url),
                    Some(format!("#{}", created.number)),
                )
            }
        };
        effects.push(effect);
        Ok(effects)
    }
}

// ---------------------------------------------------------------------------
// GerritDestination
// ---------------------------------------------------------------------------

/// A destination publishing to Gerrit via `refs/for/<branch>`, ensuring a
/// valid `Change-Id` trailer on every commit.
pub struct GerritDestination {
    base: GitDestination,
    /// Explicit Change-Id override (validated), e.g. from the CLI.
    change_id: Option<String>,
    topic: Option<String>,
}

impl GerritDestination {
    /// Wrap `base`; its push ref should already be `refs/for/<branch>`.
    ///
    /// # Errors
    /// [`FerryError::Validation`] when `change_id` does not match the
    /// Gerrit Change ID pattern.
    pub fn new(
        base: GitDestination,
        change_id: Option<String>,
        topic: Option<String>,
    ) -> Result<Self, FerryError> {
        if let Some(id) = &change_id {
            gerrit::validate_change_id(id)?;
        }
        Ok(Self {
            base,
            change_id,
            topic,
        })
    }
}

impl Destination for GerritDestination {
    fn writer(&self, ctx: &WriterContext) -> Result<Box<dyn Writer>, FerryError> {
        Ok(Box::new(GerritWriter {
            inner: self.base.writer_for(ctx),
            change_id: self.change_id.clone(),
            topic: self.topic.clone(),
            identity: ctx.workflow_identity_user.clone(),
        }))
    }
}

struct GerritWriter {
    inner: GitWriter,
    change_id: Option<String>,
    topic: Option<String>,
    identity: String,
}

impl Writer for GerritWriter {
    fn destination_status(
        &self,
        glob: &Glob,
        label: &str,
    ) -> Result<Option<DestinationStatus>, FerryError> {
        self.inner.destination_status(glob, label)
    }

    fn resolve_baseline(
        &self,
        glob: &Glob,
        label: &str,
        value: &str,
    ) -> Result<Option<ferry_git::GitOid>, FerryError> {
        self.inner.resolve_baseline(glob, label, value)
    }

    fn write(
        &self,
        transform: &TransformResult,
        glob: &Glob,
        console: &dyn Console,
    ) -> Result<Vec<DestinationEffect>, FerryError> {
        let mut adjusted = transform.clone();

        let change_id = match labels::trailer_block(&adjusted.summary).last(gerrit::CHANGE_ID_LABEL)
        {
            Some(existing) => {
                gerrit::validate_change_id(existing)?;
                existing.to_owned()
            }
            None => {
                let id = self.change_id.clone().unwrap_or_else(|| {
                    gerrit::derive_change_id(
                        &self.identity,
                        adjusted.current_revision.id().as_str(),
                    )
                });
                adjusted.summary =
                    labels::append_label(&adjusted.summary, gerrit::CHANGE_ID_LABEL, &id);
                id
            }
        };

        if let Some(topic) = &self.topic {
            console.info(&format!("uploading with topic '{topic}'"));
        }

        let mut effects = self.inner.write(&adjusted, glob, console)?;
        for effect in &mut effects {
            effect.reference = Some(change_id.clone());
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PullRequest;
    use std::sync::Mutex;

    /// Scripted API double recording calls.
    #[derive(Default)]
    struct FakeApi {
        existing: Option<PullRequest>,
        calls: Mutex<Vec<String>>,
    }

    impl CodeReviewApi for FakeApi {
        fn find_pull(&self, branch: &str) -> Result<Option<PullRequest>, FerryError> {
            self.calls.lock().unwrap().push(format!("find {branch}"));
            Ok(self.existing.clone())
        }

        fn create_pull(&self, params: &PullParams) -> Result<PullRequest, FerryError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {}", params.head));
            Ok(PullRequest {
                number: 7,
                url: "https://example.com/pull/7".to_owned(),
                mergeable_state: None,
            })
        }

        fn update_pull(&self, number: u64, _params: &PullParams) -> Result<PullRequest, FerryError> {
            self.calls.lock().unwrap().push(format!("update {number}"));
            Ok(PullRequest {
                number,
                url: format!("https://example.com/pull/{number}"),
                mergeable_state: None,
            })
        }

        fn delete_branch(&self, branch: &str) -> Result<(), FerryError> {
            self.calls.lock().unwrap().push(format!("delete {branch}"));
            Ok(())
        }
    }

    #[test]
    fn allowlist_defaults_to_clean() {
        assert_eq!(DEFAULT_ALLOW_EMPTY_DIFF_MERGE_STATUSES, &["clean"]);
    }

    #[test]
    fn fake_api_scripts_existing_pull() {
        let api = FakeApi {
            existing: Some(PullRequest {
                number: 3,
                url: "https://example.com/pull/3".to_owned(),
                mergeable_state: Some("clean".to_owned()),
            }),
            ..FakeApi::default()
        };
        let found = api.find_pull("feature").unwrap().unwrap();
        assert_eq!(found.number, 3);
        assert_eq!(found.mergeable_state.as_deref(), Some("clean"));
    }
}
