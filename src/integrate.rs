//! Integrate-label resolution: merging or including files from a remote
//! feature branch at migration time.
//!
//! A commit message may carry `COPYBARA_INTEGRATE_REVIEW=<url> <ref>` lines
//! (or provider-specific variants). Per the configured strategy, the writer
//! either copies the feature's file changes into the commit being built,
//! creates a fake-merge commit whose second parent is the feature tip, or
//! both. Labels resolving to the same (url, ref) pair are de-duplicated —
//! a second identical merge would add nothing but noise to baseline scans.

use ferry_git::{FetchOptions, GitError, GitOid, GitRepo};
use tracing::debug;

use crate::api::gerrit;
use crate::console::Console;
use crate::error::FerryError;
use crate::model::labels;

/// The label that requests an integration. The name is part of the wire
/// format shared with other migration tooling; note the `=` separator, not
/// the trailer-style `: `.
pub const INTEGRATE_LABEL: &str = "COPYBARA_INTEGRATE_REVIEW";

/// Git's well-known empty tree, used as the diff base when the current
/// history is unborn or unrelated to the feature.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// What an integration contributes to the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// A merge commit whose tree is the migrated tree unchanged.
    FakeMerge,
    /// A merge commit plus the feature branch's file changes.
    FakeMergeAndIncludeFiles,
    /// Only the feature branch's file changes; no merge commit.
    IncludeFiles,
}

impl Strategy {
    const fn includes_files(self) -> bool {
        matches!(self, Self::FakeMergeAndIncludeFiles | Self::IncludeFiles)
    }

    const fn merges(self) -> bool {
        matches!(self, Self::FakeMerge | Self::FakeMergeAndIncludeFiles)
    }
}

// ---------------------------------------------------------------------------
// IntegrateTarget
// ---------------------------------------------------------------------------

/// A parsed integrate label value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrateTarget {
    /// `<url> [<ref>]`.
    Plain {
        url: String,
        reference: Option<String>,
    },
    /// `https://github.com/<org>/<repo>/pull/<N> from <user>:<branch> <sha>`.
    GithubPull {
        url: String,
        number: u64,
        head: String,
        sha: Option<String>,
    },
    /// `gerrit <host> <change#> Patch Set <n> [<changeId>]`.
    Gerrit {
        host: String,
        change: u64,
        patch_set: u32,
        change_id: Option<String>,
    },
}

impl IntegrateTarget {
    /// Parse one label value.
    ///
    /// # Errors
    /// [`FerryError::Validation`] on a malformed value.
    pub fn parse(value: &str) -> Result<Self, FerryError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(FerryError::validation(format!(
                "empty {INTEGRATE_LABEL} label"
            )));
        }

        if let Some(rest) = value.strip_prefix("gerrit ") {
            return Self::parse_gerrit(rest);
        }

        if let Some((url_part, rest)) = value.split_once(" from ")
            && let Some(idx) = url_part.find("/pull/")
        {
            let url = url_part[..idx].to_owned();
            let number: u64 = url_part[idx + "/pull/".len()..]
                .trim_end_matches('/')
                .parse()
                .map_err(|_| {
                    FerryError::validation(format!(
                        "invalid pull request number in integrate label '{value}'"
                    ))
                })?;
            let mut tokens = rest.split_whitespace();
            let Some(head) = tokens.next() else {
                return Err(FerryError::validation(format!(
                    "integrate label '{value}' is missing the head branch"
                )));
            };
            return Ok(Self::GithubPull {
                url,
                number,
                head: head.to_owned(),
                sha: tokens.next().map(str::to_owned),
            });
        }

        match value.split_once(' ') {
            Some((url, reference)) => Ok(Self::Plain {
                url: url.to_owned(),
                reference: Some(reference.trim().to_owned()),
            }),
            None => Ok(Self::Plain {
                url: value.to_owned(),
                reference: None,
            }),
        }
    }

    fn parse_gerrit(rest: &str) -> Result<Self, FerryError> {
        let mut tokens = rest.split_whitespace();
        let (Some(host), Some(change), Some(patch_kw), Some(set_kw), Some(patch_set)) = (
            tokens.next(),
            tokens.next(),
            tokens.next(),
            tokens.next(),
            tokens.next(),
        ) else {
            return Err(FerryError::validation(format!(
                "malformed gerrit integrate label 'gerrit {rest}'"
            )));
        };
        if patch_kw != "Patch" || set_kw != "Set" {
            return Err(FerryError::validation(format!(
                "malformed gerrit integrate label 'gerrit {rest}': expected 'Patch Set'"
            )));
        }
        let change: u64 = change.parse().map_err(|_| {
            FerryError::validation(format!("invalid gerrit change number '{change}'"))
        })?;
        let patch_set: u32 = patch_set.parse().map_err(|_| {
            FerryError::validation(format!("invalid gerrit patch set '{patch_set}'"))
        })?;
        let change_id = tokens.next().map(str::to_owned);
        if let Some(id) = &change_id {
            gerrit::validate_change_id(id)?;
        }
        Ok(Self::Gerrit {
            host: host.to_owned(),
            change,
            patch_set,
            change_id,
        })
    }

    fn fetch_url(&self) -> &str {
        match self {
            Self::Plain { url, .. } | Self::GithubPull { url, .. } => url,
            Self::Gerrit { host, .. } => host,
        }
    }

    fn fetch_ref(&self) -> Option<String> {
        match self {
            Self::Plain { reference, .. } => reference.clone(),
            Self::GithubPull { number, .. } => Some(format!("refs/pull/{number}/head")),
            Self::Gerrit {
                change, patch_set, ..
            } => Some(gerrit::change_ref(*change, *patch_set)),
        }
    }

    /// The sha the label pinned, when it carries one.
    fn requested_sha(&self) -> Option<&str> {
        match self {
            Self::GithubPull { sha, .. } => sha.as_deref(),
            _ => None,
        }
    }

    /// First line of the fake-merge commit message.
    fn merge_summary(&self, merged: &GitOid) -> String {
        match self {
            Self::Plain { .. } => format!("Merge of {merged}"),
            Self::GithubPull { number, head, .. } => {
                format!("Merge pull request #{number} from {head}")
            }
            Self::Gerrit {
                change, patch_set, ..
            } => format!("Merge Gerrit change {change} Patch Set {patch_set}"),
        }
    }

    fn dedup_key(&self) -> (String, String) {
        (
            self.fetch_url().to_owned(),
            self.fetch_ref().unwrap_or_default(),
        )
    }

    fn describe(&self) -> String {
        match self {
            Self::Plain { url, reference } => match reference {
                Some(reference) => format!("{url} {reference}"),
                None => url.clone(),
            },
            Self::GithubPull { url, number, .. } => format!("{url}/pull/{number}"),
            Self::Gerrit {
                host,
                change,
                patch_set,
                ..
            } => format!("{host} change {change} patch set {patch_set}"),
        }
    }
}

// ---------------------------------------------------------------------------
// IntegrateResolver
// ---------------------------------------------------------------------------

/// Resolves integrate labels against a destination scratch repo.
#[derive(Clone, Debug)]
pub struct IntegrateResolver {
    strategy: Strategy,
    label_name: String,
    ignore_errors: bool,
}

impl IntegrateResolver {
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            label_name: INTEGRATE_LABEL.to_owned(),
            ignore_errors: false,
        }
    }

    #[must_use]
    pub fn label_name(mut self, name: impl Into<String>) -> Self {
        self.label_name = name.into();
        self
    }

    /// Convert network-level failures (unreachable repo, unknown ref) into
    /// a warning and a no-op for that label.
    #[must_use]
    pub const fn ignore_errors(mut self, yes: bool) -> Self {
        self.ignore_errors = yes;
        self
    }

    /// Integrate targets named by `message`, in order, de-duplicated.
    ///
    /// # Errors
    /// [`FerryError::Validation`] on a malformed label.
    pub fn targets(&self, message: &str) -> Result<Vec<IntegrateTarget>, FerryError> {
        let mut targets = Vec::new();
        let mut seen = Vec::new();
        for line in message.lines() {
            let Some(value) = line.strip_prefix(&format!("{}=", self.label_name)) else {
                continue;
            };
            let target = IntegrateTarget::parse(value)?;
            let key = target.dedup_key();
            if seen.contains(&key) {
                debug!(label = %line, "skipping duplicate integrate label");
                continue;
            }
            seen.push(key);
            targets.push(target);
        }
        Ok(targets)
    }

    /// Pre-staging phase: copy each referenced feature's file changes
    /// (relative to its merge-base with the current HEAD) into the
    /// work-tree. No commit is created.
    ///
    /// # Errors
    /// Fetch failures abort unless `ignore_errors`; tree surgery failures
    /// always abort.
    pub fn apply_includes(
        &self,
        scratch: &GitRepo,
        message: &str,
        console: &dyn Console,
    ) -> Result<(), FerryError> {
        if !self.strategy.includes_files() {
            return Ok(());
        }
        for target in self.targets(message)? {
            let Some(feature) = self.fetch_target(scratch, &target, console)? else {
                continue;
            };
            let base = match scratch.resolve_reference("HEAD") {
                Ok(head) => scratch
                    .merge_base(head.as_str(), feature.as_str())
                    .map_err(|e| FerryError::git("computing integrate merge-base", e))?
                    .map_or_else(|| EMPTY_TREE.to_owned(), |b| b.to_string()),
                // Unborn history: everything the feature has is new.
                Err(_) => EMPTY_TREE.to_owned(),
            };

            let statuses = scratch
                .diff_name_status(&base, feature.as_str())
                .map_err(|e| FerryError::git("diffing integrated feature", e))?;

            let mut to_checkout = Vec::new();
            for status in &statuses {
                if status.status == 'D' {
                    let gone = scratch
                        .work_tree()
                        .map(|wt| wt.join(&status.path))
                        .ok_or_else(|| FerryError::Internal {
                            message: "integrate resolver needs a work-tree".to_owned(),
                        })?;
                    if gone.exists() {
                        std::fs::remove_file(&gone)?;
                    }
                } else {
                    if let Some(from) = &status.from_path {
                        let old = scratch
                            .work_tree()
                            .map(|wt| wt.join(from))
                            .ok_or_else(|| FerryError::Internal {
                                message: "integrate resolver needs a work-tree".to_owned(),
                            })?;
                        if old.exists() {
                            std::fs::remove_file(&old)?;
                        }
                    }
                    to_checkout.push(status.path.clone());
                }
            }
            if !to_checkout.is_empty() {
                scratch
                    .checkout_paths(feature.as_str(), &to_checkout)
                    .map_err(|e| FerryError::git("copying integrated files", e))?;
            }
        }
        Ok(())
    }

    /// Post-commit phase: chain one fake-merge commit per target. Each merge
    /// keeps the current tree and gains the feature tip as second parent.
    /// `trailer` labels (e.g. the origin rev-id) are appended to every merge
    /// message. Returns the final tip.
    ///
    /// # Errors
    /// Fetch failures abort unless `ignore_errors`.
    pub fn apply_merges(
        &self,
        scratch: &GitRepo,
        message: &str,
        trailer: &[(String, String)],
        console: &dyn Console,
    ) -> Result<GitOid, FerryError> {
        let mut tip = scratch
            .resolve_reference("HEAD")
            .map_err(|e| FerryError::git("resolving the commit under integration", e))?;
        if !self.strategy.merges() {
            return Ok(tip);
        }
        for target in self.targets(message)? {
            let Some(feature) = self.fetch_target(scratch, &target, console)? else {
                continue;
            };
            let tree = scratch
                .tree_of(tip.as_str())
                .map_err(|e| FerryError::git("reading the tree under integration", e))?;
            let mut merge_message = format!("{}\n", target.merge_summary(&feature));
            if let IntegrateTarget::Gerrit {
                change_id: Some(change_id),
                ..
            } = &target
            {
                merge_message =
                    labels::append_label(&merge_message, gerrit::CHANGE_ID_LABEL, change_id);
            }
            for (name, value) in trailer {
                merge_message = labels::append_label(&merge_message, name, value);
            }
            let merge = scratch
                .commit_tree(&tree, &[tip.clone(), feature], &merge_message, None)
                .map_err(|e| FerryError::git("creating fake-merge commit", e))?;
            scratch
                .update_ref("HEAD", merge.as_str())
                .map_err(|e| FerryError::git("advancing to fake-merge commit", e))?;
            tip = merge;
        }
        Ok(tip)
    }

    /// Fetch a target into the scratch repo; `None` when the failure was
    /// ignorable.
    fn fetch_target(
        &self,
        scratch: &GitRepo,
        target: &IntegrateTarget,
        console: &dyn Console,
    ) -> Result<Option<GitOid>, FerryError> {
        let refspecs: Vec<String> = target.fetch_ref().into_iter().collect();
        let fetched = scratch.fetch(
            target.fetch_url(),
            &refspecs,
            &FetchOptions {
                force: true,
                ..FetchOptions::default()
            },
        );
        if let Err(err) = fetched {
            // Bad label values are the user's to fix regardless.
            if self.ignore_errors && !matches!(err, GitError::Validation(_)) {
                console.warn(&format!(
                    "could not integrate {}: {err}",
                    target.describe()
                ));
                return Ok(None);
            }
            return Err(FerryError::git(
                format!("fetching integrate target {}", target.describe()),
                err,
            ));
        }

        let tip = scratch
            .resolve_reference("FETCH_HEAD")
            .map_err(|e| FerryError::git("resolving integrated feature tip", e))?;

        if let Some(requested) = target.requested_sha() {
            if tip.as_str() != requested {
                console.warn(&format!(
                    "{} has more changes after {requested}",
                    target.describe()
                ));
            }
            if let Ok(pinned) = scratch.resolve_reference(requested) {
                return Ok(Some(pinned));
            }
        }
        Ok(Some(tip))
    }
}
