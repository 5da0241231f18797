//! Migration configuration (`ferry.toml`).
//!
//! A config file declares named workflows and mirror jobs. Missing fields
//! use sensible defaults; unknown fields are rejected. The file instantiates
//! the same values a scripting front-end would: origins, destinations,
//! globs, and mode knobs.
//!
//! ```toml
//! [workflow.default]
//! mode = "squash"
//!
//! [workflow.default.origin]
//! type = "git"
//! url = "https://example.com/origin.git"
//! ref = "main"
//!
//! [workflow.default.destination]
//! type = "git"
//! url = "https://example.com/dest.git"
//! fetch = "main"
//! push = "main"
//!
//! [mirror.backup]
//! origin = "https://example.com/origin.git"
//! destination = "https://example.com/backup.git"
//! refspecs = ["refs/heads/*:refs/heads/*"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_git::{GitEnv, RepoCache};
use serde::Deserialize;

use crate::authoring::Authoring;
use crate::destination::review::GerritDestination;
use crate::destination::{Destination, GitDestination};
use crate::error::FerryError;
use crate::integrate::{IntegrateResolver, Strategy};
use crate::mirror::Mirror;
use crate::model::{Author, Glob};
use crate::origin::{FolderOrigin, GitOrigin, Origin};
use crate::workflow::{Workflow, WorkflowMode};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed `ferry.toml`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FerryConfig {
    /// Root directory of the bare-repo cache. Defaults to
    /// `$FERRY_CACHE`, then `$HOME/.cache/ferry`.
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// Committer identity for destination commits, `Name <email>`.
    #[serde(default = "default_committer")]
    pub committer: String,

    /// Named workflows.
    #[serde(default)]
    pub workflow: BTreeMap<String, WorkflowCfg>,

    /// Named mirror jobs.
    #[serde(default)]
    pub mirror: BTreeMap<String, MirrorCfg>,
}

fn default_committer() -> String {
    "Ferry <ferry@localhost>".to_owned()
}

/// One workflow section.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowCfg {
    #[serde(default)]
    pub mode: ModeCfg,
    pub origin: OriginCfg,
    pub destination: DestinationCfg,
    #[serde(default)]
    pub origin_files: GlobCfg,
    #[serde(default)]
    pub destination_files: GlobCfg,
    #[serde(default)]
    pub authoring: AuthoringCfg,
    #[serde(default)]
    pub integrate: Option<IntegrateCfg>,
    #[serde(default)]
    pub migrate_noop_changes: bool,
    #[serde(default = "default_true")]
    pub set_rev_id: bool,
}

const fn default_true() -> bool {
    true
}

/// Workflow execution mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeCfg {
    #[default]
    Squash,
    Iterative,
    ChangeRequest,
}

impl From<ModeCfg> for WorkflowMode {
    fn from(mode: ModeCfg) -> Self {
        match mode {
            ModeCfg::Squash => Self::Squash,
            ModeCfg::Iterative => Self::Iterative,
            ModeCfg::ChangeRequest => Self::ChangeRequest,
        }
    }
}

/// Origin selection.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OriginCfg {
    /// A git repository.
    Git {
        url: String,
        #[serde(rename = "ref", default = "default_main_ref")]
        reference: String,
        #[serde(default = "default_true")]
        first_parent: bool,
        #[serde(default)]
        include_branch_commit_logs: bool,
        #[serde(default)]
        partial_fetch: bool,
        #[serde(default)]
        visit_page_size: Option<usize>,
        /// Rebase checkouts onto this ref before materializing trees.
        #[serde(default)]
        rebase_ref: Option<String>,
        /// Override the label recording migrated revisions.
        #[serde(default)]
        label: Option<String>,
    },
    /// A local directory imported as a single change.
    Folder {
        path: PathBuf,
        /// Author of the synthetic import change, `Name <email>`.
        #[serde(default)]
        author: Option<String>,
    },
}

fn default_main_ref() -> String {
    "main".to_owned()
}

/// Destination selection.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DestinationCfg {
    /// Commits pushed directly to a branch.
    Git {
        url: String,
        #[serde(default = "default_main_ref")]
        fetch: String,
        #[serde(default = "default_main_ref")]
        push: String,
        #[serde(default)]
        skip_push: bool,
        #[serde(default)]
        local_repo_path: Option<PathBuf>,
    },
    /// Commits pushed to a feature branch for an external pull request;
    /// the hosting-API layer is attached programmatically.
    GithubPr {
        url: String,
        #[serde(default = "default_main_ref")]
        destination_ref: String,
        /// Feature branch name; derived from the workflow name when unset.
        #[serde(default)]
        pr_branch: Option<String>,
    },
    /// Commits pushed to Gerrit's `refs/for/<branch>`.
    Gerrit {
        url: String,
        #[serde(default = "default_main_ref")]
        destination_branch: String,
    },
}

/// Include/exclude pattern lists. Defaults to everything.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobCfg {
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["**".to_owned()]
}

impl Default for GlobCfg {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

impl GlobCfg {
    fn build(&self) -> Result<Glob, FerryError> {
        Glob::new(&self.include, &self.exclude)
    }
}

/// Author mapping policy.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthoringCfg {
    #[serde(default)]
    pub mode: AuthoringModeCfg,
    /// The fixed or default author, `Name <email>`.
    #[serde(default)]
    pub author: Option<String>,
    /// Emails kept as-is under `allowlist`.
    #[serde(default)]
    pub allowed: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoringModeCfg {
    #[default]
    PassThru,
    Overwrite,
    Allowlist,
}

impl AuthoringCfg {
    fn build(&self) -> Result<Authoring, FerryError> {
        let author = || -> Result<Author, FerryError> {
            let Some(author) = &self.author else {
                return Err(FerryError::validation(
                    "authoring modes other than pass_thru need an 'author'",
                ));
            };
            Author::parse(author)
        };
        match self.mode {
            AuthoringModeCfg::PassThru => Ok(Authoring::PassThru),
            AuthoringModeCfg::Overwrite => Ok(Authoring::Overwrite(author()?)),
            AuthoringModeCfg::Allowlist => Ok(Authoring::Allowlist {
                default: author()?,
                allowed: self.allowed.clone(),
            }),
        }
    }
}

/// Integrate-label handling.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrateCfg {
    #[serde(default)]
    pub strategy: IntegrateStrategyCfg,
    #[serde(default)]
    pub ignore_errors: bool,
    /// Override the label name scanned for integrate requests.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrateStrategyCfg {
    #[default]
    FakeMerge,
    FakeMergeAndIncludeFiles,
    IncludeFiles,
}

impl IntegrateCfg {
    fn build(&self) -> IntegrateResolver {
        let strategy = match self.strategy {
            IntegrateStrategyCfg::FakeMerge => Strategy::FakeMerge,
            IntegrateStrategyCfg::FakeMergeAndIncludeFiles => Strategy::FakeMergeAndIncludeFiles,
            IntegrateStrategyCfg::IncludeFiles => Strategy::IncludeFiles,
        };
        let mut resolver = IntegrateResolver::new(strategy).ignore_errors(self.ignore_errors);
        if let Some(label) = &self.label {
            resolver = resolver.label_name(label);
        }
        resolver
    }
}

/// One mirror section.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorCfg {
    pub origin: String,
    pub destination: String,
    #[serde(default = "default_mirror_refspecs")]
    pub refspecs: Vec<String>,
}

fn default_mirror_refspecs() -> Vec<String> {
    vec!["refs/heads/*:refs/heads/*".to_owned()]
}

// ---------------------------------------------------------------------------
// CLI knobs threaded into construction
// ---------------------------------------------------------------------------

/// Per-invocation options layered over the config file.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub force: bool,
    pub dry_run: bool,
    pub push_options: Vec<String>,
    pub gerrit_change_id: Option<String>,
    pub gerrit_topic: Option<String>,
    pub github_destination_pr_branch: Option<String>,
    pub origin_url_override: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading and building
// ---------------------------------------------------------------------------

impl FerryConfig {
    /// Load and parse a config file.
    ///
    /// # Errors
    /// [`FerryError::Validation`] naming the file and the parse problem.
    pub fn load(path: &Path) -> Result<Self, FerryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FerryError::validation(format!("cannot read config '{}': {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            FerryError::validation(format!("invalid config '{}': {e}", path.display()))
        })
    }

    /// Resolve the workflow to run: an explicit name, or the only one.
    ///
    /// # Errors
    /// [`FerryError::Validation`] for unknown names or an ambiguous default.
    pub fn resolve_workflow_name(&self, requested: Option<&str>) -> Result<String, FerryError> {
        resolve_name(&self.workflow, requested, "workflow")
    }

    /// Resolve the mirror to run: an explicit name, or the only one.
    ///
    /// # Errors
    /// [`FerryError::Validation`] for unknown names or an ambiguous default.
    pub fn resolve_mirror_name(&self, requested: Option<&str>) -> Result<String, FerryError> {
        resolve_name(&self.mirror, requested, "mirror")
    }

    /// Open the bare-repo cache this config points at.
    ///
    /// # Errors
    /// [`FerryError`] when the cache root cannot be created.
    pub fn open_cache(&self) -> Result<Arc<RepoCache>, FerryError> {
        let root = self.cache_root.clone().unwrap_or_else(default_cache_root);
        let cache = RepoCache::new(root, GitEnv::new())
            .map_err(|e| FerryError::git("opening the bare-repo cache", e))?;
        Ok(Arc::new(cache))
    }

    /// Build a runnable workflow from its config section.
    ///
    /// # Errors
    /// [`FerryError::Validation`] on inconsistent configuration.
    pub fn build_workflow(
        &self,
        name: &str,
        cache: Arc<RepoCache>,
        opts: &RunOptions,
    ) -> Result<Workflow, FerryError> {
        let Some(cfg) = self.workflow.get(name) else {
            return Err(FerryError::validation(format!(
                "workflow '{name}' is not defined in the config"
            )));
        };
        let committer = Author::parse(&self.committer)?;
        let origin = build_origin(&cfg.origin, Arc::clone(&cache), opts)?;
        let destination = build_destination(
            &cfg.destination,
            Arc::clone(&cache),
            committer,
            cfg.integrate.as_ref(),
            name,
            opts,
        )?;

        Ok(
            Workflow::new(name, cfg.mode.into(), origin, destination)
                .origin_files(cfg.origin_files.build()?)
                .destination_files(cfg.destination_files.build()?)
                .authoring(cfg.authoring.build()?)
                .migrate_noop_changes(cfg.migrate_noop_changes)
                .set_rev_id(cfg.set_rev_id)
                .force(opts.force)
                .dry_run(opts.dry_run),
        )
    }

    /// Build a runnable mirror job from its config section.
    ///
    /// # Errors
    /// [`FerryError::Validation`] on inconsistent configuration.
    pub fn build_mirror(
        &self,
        name: &str,
        cache: Arc<RepoCache>,
        force: bool,
    ) -> Result<Mirror, FerryError> {
        let Some(cfg) = self.mirror.get(name) else {
            return Err(FerryError::validation(format!(
                "mirror '{name}' is not defined in the config"
            )));
        };
        Ok(Mirror::new(
            name,
            cache,
            &cfg.origin,
            &cfg.destination,
            &cfg.refspecs,
        )?
        .force(force))
    }
}

fn resolve_name<T>(
    sections: &BTreeMap<String, T>,
    requested: Option<&str>,
    kind: &str,
) -> Result<String, FerryError> {
    match requested {
        Some(name) => {
            if sections.contains_key(name) {
                Ok(name.to_owned())
            } else {
                Err(FerryError::validation(format!(
                    "{kind} '{name}' is not defined; available: {}",
                    sections.keys().cloned().collect::<Vec<_>>().join(", ")
                )))
            }
        }
        None => {
            let mut names = sections.keys();
            match (names.next(), names.next()) {
                (Some(only), None) => Ok(only.clone()),
                (None, _) => Err(FerryError::validation(format!(
                    "the config defines no {kind}s"
                ))),
                (Some(_), Some(_)) => Err(FerryError::validation(format!(
                    "the config defines several {kind}s; name one explicitly"
                ))),
            }
        }
    }
}

fn default_cache_root() -> PathBuf {
    if let Some(root) = std::env::var_os("FERRY_CACHE") {
        return PathBuf::from(root);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache").join("ferry"),
        None => std::env::temp_dir().join("ferry-cache"),
    }
}

fn build_origin(
    cfg: &OriginCfg,
    cache: Arc<RepoCache>,
    opts: &RunOptions,
) -> Result<Box<dyn Origin>, FerryError> {
    match cfg {
        OriginCfg::Git {
            url,
            reference,
            first_parent,
            include_branch_commit_logs,
            partial_fetch,
            visit_page_size,
            rebase_ref,
            label,
        } => {
            let mut origin = GitOrigin::new(cache, url, reference)
                .first_parent(*first_parent)
                .include_branch_commit_logs(*include_branch_commit_logs)
                .partial_fetch(*partial_fetch)
                .url_override(opts.origin_url_override.clone());
            if let Some(size) = visit_page_size {
                origin = origin.visit_page_size(*size);
            }
            if let Some(rebase_ref) = rebase_ref {
                origin = origin.origin_rebase_ref(rebase_ref);
            }
            if let Some(label) = label {
                origin = origin.label(label);
            }
            Ok(Box::new(origin))
        }
        OriginCfg::Folder { path, author } => {
            let author = match author {
                Some(author) => Author::parse(author)?,
                None => Author::new("Ferry", "ferry@localhost"),
            };
            Ok(Box::new(FolderOrigin::new(path.clone(), author)))
        }
    }
}

fn build_destination(
    cfg: &DestinationCfg,
    cache: Arc<RepoCache>,
    committer: Author,
    integrate: Option<&IntegrateCfg>,
    workflow_name: &str,
    opts: &RunOptions,
) -> Result<Box<dyn Destination>, FerryError> {
    let apply_common = |mut dest: GitDestination| -> GitDestination {
        dest = dest
            .push_options(opts.push_options.clone())
            .force(opts.force)
            .allow_empty(opts.force);
        if let Some(integrate) = integrate {
            dest = dest.integrate(integrate.build());
        }
        dest
    };

    match cfg {
        DestinationCfg::Git {
            url,
            fetch,
            push,
            skip_push,
            local_repo_path,
        } => {
            let mut dest =
                apply_common(GitDestination::new(cache, url, fetch, push, committer))
                    .skip_push(*skip_push);
            if let Some(path) = local_repo_path {
                dest = dest.local_repo_path(path);
            }
            Ok(Box::new(dest))
        }
        DestinationCfg::GithubPr {
            url,
            destination_ref,
            pr_branch,
        } => {
            let branch = opts
                .github_destination_pr_branch
                .clone()
                .or_else(|| pr_branch.clone())
                .unwrap_or_else(|| format!("ferry/{workflow_name}"));
            let dest = apply_common(GitDestination::new(
                cache,
                url,
                destination_ref,
                branch,
                committer,
            ));
            Ok(Box::new(dest))
        }
        DestinationCfg::Gerrit {
            url,
            destination_branch,
        } => {
            // Gerrit's magic ref; the topic rides along as a push suffix.
            let push = match &opts.gerrit_topic {
                Some(topic) => format!("refs/for/{destination_branch}%topic={topic}"),
                None => format!("refs/for/{destination_branch}"),
            };
            let base = apply_common(GitDestination::new(
                cache,
                url,
                destination_branch,
                push,
                committer,
            ));
            let gerrit = GerritDestination::new(
                base,
                opts.gerrit_change_id.clone(),
                opts.gerrit_topic.clone(),
            )?;
            Ok(Box::new(gerrit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
committer = "Migration Bot <bot@example.com>"

[workflow.default]
mode = "iterative"
migrate_noop_changes = true

[workflow.default.origin]
type = "git"
url = "https://example.com/origin.git"
ref = "main"

[workflow.default.destination]
type = "git"
url = "https://example.com/dest.git"
fetch = "main"
push = "main"

[workflow.default.origin_files]
include = ["src/**"]
exclude = ["src/**/testdata/**"]

[mirror.backup]
origin = "https://example.com/origin.git"
destination = "https://example.com/backup.git"
refspecs = ["refs/heads/main:refs/heads/origin_main"]
"#;

    #[test]
    fn parses_sample_config() {
        let config: FerryConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.committer, "Migration Bot <bot@example.com>");
        let wf = &config.workflow["default"];
        assert_eq!(wf.mode, ModeCfg::Iterative);
        assert!(wf.migrate_noop_changes);
        assert_eq!(wf.origin_files.include, vec!["src/**"]);
        assert!(config.mirror.contains_key("backup"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<FerryConfig>("unknown_key = 1\n").unwrap_err();
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn missing_file_is_validation_error() {
        let err = FerryConfig::load(Path::new("/no/such/ferry.toml")).unwrap_err();
        assert!(matches!(err, FerryError::Validation { .. }));
    }

    #[test]
    fn resolve_name_defaults_to_single_entry() {
        let config: FerryConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.resolve_workflow_name(None).unwrap(), "default");
        assert_eq!(config.resolve_mirror_name(None).unwrap(), "backup");
        assert!(config.resolve_workflow_name(Some("missing")).is_err());
    }

    #[test]
    fn gerrit_destination_validates_change_id_override() {
        let toml_src = r#"
[workflow.upload]
mode = "change_request"

[workflow.upload.origin]
type = "git"
url = "https://example.com/origin.git"

[workflow.upload.destination]
type = "gerrit"
url = "https://example.com/dest.git"
destination_branch = "main"
"#;
        let config: FerryConfig = toml::from_str(toml_src).unwrap();
        let cache = Arc::new(
            RepoCache::new(std::env::temp_dir().join("ferry-test-cache"), GitEnv::new()).unwrap(),
        );
        let opts = RunOptions {
            gerrit_change_id: Some("Inot-hex".to_owned()),
            ..RunOptions::default()
        };
        let err = config
            .build_workflow("upload", cache, &opts)
            .unwrap_err();
        assert!(format!("{err}").contains("does not match Gerrit Change ID pattern"));
    }

    #[test]
    fn default_glob_is_all_files() {
        let glob = GlobCfg::default().build().unwrap();
        assert!(glob.is_all_files());
    }
}
