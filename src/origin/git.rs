//! Git origin: reads history from a remote git repository through the
//! bare-repo cache.

use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use ferry_git::log::LogEntry;
use ferry_git::{CachedRepo, FetchOptions, GitOid, GitRepo, LogRequest, RepoCache};
use tracing::{debug, warn};

use crate::error::FerryError;
use crate::model::{Author, Change, Glob, Revision, labels};
use crate::origin::{ChangeVisitor, ChangesResponse, EmptyReason, Origin, Reader, VisitOutcome};
use crate::workdir;

/// Default label recording migrated git revisions.
pub const GIT_ORIGIN_LABEL: &str = "GitOrigin-RevId";

/// Heading prepended when merged branch-commit messages are inlined.
const BRANCH_COMMIT_LOG_HEADING: &str = "-- Branch commit log --";

/// Default page size for history walks.
pub const DEFAULT_VISIT_PAGE_SIZE: usize = 200;

// ---------------------------------------------------------------------------
// GitOrigin
// ---------------------------------------------------------------------------

/// A git repository acting as migration origin.
#[derive(Clone, Debug)]
pub struct GitOrigin {
    cache: Arc<RepoCache>,
    url: String,
    main_ref: String,
    label: String,
    first_parent: bool,
    include_branch_commit_logs: bool,
    partial_fetch: bool,
    visit_page_size: usize,
    origin_rebase_ref: Option<String>,
    url_override: Option<String>,
}

impl GitOrigin {
    #[must_use]
    pub fn new(cache: Arc<RepoCache>, url: impl Into<String>, main_ref: impl Into<String>) -> Self {
        Self {
            cache,
            url: url.into(),
            main_ref: main_ref.into(),
            label: GIT_ORIGIN_LABEL.to_owned(),
            first_parent: true,
            include_branch_commit_logs: false,
            partial_fetch: false,
            visit_page_size: DEFAULT_VISIT_PAGE_SIZE,
            origin_rebase_ref: None,
            url_override: None,
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub const fn first_parent(mut self, yes: bool) -> Self {
        self.first_parent = yes;
        self
    }

    #[must_use]
    pub const fn include_branch_commit_logs(mut self, yes: bool) -> Self {
        self.include_branch_commit_logs = yes;
        self
    }

    #[must_use]
    pub const fn partial_fetch(mut self, yes: bool) -> Self {
        self.partial_fetch = yes;
        self
    }

    #[must_use]
    pub const fn visit_page_size(mut self, size: usize) -> Self {
        self.visit_page_size = size;
        self
    }

    /// Rebase checkouts onto this ref before materializing the tree.
    #[must_use]
    pub fn origin_rebase_ref(mut self, reference: impl Into<String>) -> Self {
        self.origin_rebase_ref = Some(reference.into());
        self
    }

    /// CLI override of the origin URL; a warning is logged when it takes
    /// effect.
    #[must_use]
    pub fn url_override(mut self, url: Option<String>) -> Self {
        self.url_override = url;
        self
    }

    fn effective_url(&self) -> &str {
        match &self.url_override {
            Some(override_url) => {
                warn!(
                    configured = %self.url,
                    using = %override_url,
                    "origin url overridden from the command line"
                );
                override_url
            }
            None => &self.url,
        }
    }
}

impl Origin for GitOrigin {
    fn label_name(&self) -> &str {
        &self.label
    }

    fn reader(&self, origin_files: &Glob) -> Result<Box<dyn Reader>, FerryError> {
        let url = self.effective_url().to_owned();
        let repo = self
            .cache
            .repo_for(&url)
            .map_err(|e| FerryError::git(format!("opening cache repo for {url}"), e))?;
        repo.set_partial_fetch(self.partial_fetch)
            .map_err(|e| FerryError::git(format!("configuring partial fetch for {url}"), e))?;
        Ok(Box::new(GitOriginReader {
            url,
            repo,
            glob: origin_files.clone(),
            main_ref: self.main_ref.clone(),
            first_parent: self.first_parent,
            include_branch_commit_logs: self.include_branch_commit_logs,
            visit_page_size: self.visit_page_size.max(1),
            origin_rebase_ref: self.origin_rebase_ref.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// GitOriginReader
// ---------------------------------------------------------------------------

/// Reader over one git origin, filtered by a glob.
pub struct GitOriginReader {
    url: String,
    repo: CachedRepo,
    glob: Glob,
    main_ref: String,
    first_parent: bool,
    include_branch_commit_logs: bool,
    visit_page_size: usize,
    origin_rebase_ref: Option<String>,
}

impl GitOriginReader {
    /// Mirror heads and tags from the origin into the cache repo.
    fn fetch_origin(&self) -> Result<(), FerryError> {
        self.repo
            .fetch(
                &[
                    "+refs/heads/*:refs/heads/*".to_owned(),
                    "+refs/tags/*:refs/tags/*".to_owned(),
                ],
                &FetchOptions {
                    prune: true,
                    force: true,
                    depth: None,
                },
            )
            .map_err(|e| FerryError::git(format!("fetching {}", self.url), e))
    }

    fn git(&self) -> &GitRepo {
        self.repo.repo()
    }

    fn revision_from_entry(&self, entry: &LogEntry) -> Result<Revision, FerryError> {
        let mut rev = Revision::new(entry.commit.clone())
            .with_url(&self.url)
            .with_author(Author::new(&entry.author.name, &entry.author.email))
            .with_labels(labels::trailer_block(&entry.body));
        if let Ok(ts) = DateTime::parse_from_rfc3339(&entry.author.date) {
            rev = rev.with_timestamp(ts);
        }
        Ok(rev)
    }

    fn change_from_entry(&self, entry: &LogEntry) -> Result<Change, FerryError> {
        let revision = self.revision_from_entry(entry)?;
        let timestamp = DateTime::parse_from_rfc3339(&entry.author.date).map_err(|e| {
            FerryError::Internal {
                message: format!(
                    "git emitted unparseable date '{}' for {}: {e}",
                    entry.author.date, entry.commit
                ),
            }
        })?;
        Ok(Change::new(
            revision,
            entry.parents.clone(),
            Author::new(&entry.author.name, &entry.author.email),
            Author::new(&entry.committer.name, &entry.committer.email),
            timestamp,
            entry.body.clone(),
            entry.files.clone(),
            entry.is_merge(),
        ))
    }

    /// Whether an entry passes the path filter. `Glob::all_files` admits
    /// every commit, including ones with an empty file list.
    fn entry_matches_glob(&self, entry: &LogEntry) -> bool {
        if self.glob.is_all_files() {
            return true;
        }
        entry
            .files
            .as_ref()
            .is_some_and(|files| files.iter().any(|f| self.glob.matches(f)))
    }

    fn log_page(&self, start: &GitOid, skip: usize, limit: usize) -> Result<Vec<LogEntry>, FerryError> {
        let req = LogRequest::new(start.as_str())
            .first_parent(self.first_parent)
            .include_files(true)
            .include_merge_diff(self.first_parent)
            .limit(limit)
            .skip(skip);
        self.git()
            .log(&req)
            .map_err(|e| FerryError::git(format!("walking history of {}", self.url), e))
    }

    /// Inline the messages of branch commits a merge brings in, filtered by
    /// the glob, as one appended block under a fixed heading.
    fn inline_branch_logs(&self, change: Change) -> Result<Change, FerryError> {
        if !change.is_merge() || change.parents().is_empty() {
            return Ok(change);
        }
        let range = format!("{}..{}", change.parents()[0], change.id());
        let req = LogRequest::new(range)
            .first_parent(false)
            .include_files(true);
        let entries = self
            .git()
            .log(&req)
            .map_err(|e| FerryError::git(format!("reading branch log of {}", change.id()), e))?;

        let mut messages: Vec<String> = Vec::new();
        for entry in &entries {
            if entry.commit == *change.id() {
                continue;
            }
            if self.entry_matches_glob(entry) {
                messages.push(entry.body.clone());
            }
        }
        if messages.is_empty() {
            return Ok(change);
        }
        let block = format!("{BRANCH_COMMIT_LOG_HEADING}\n{}", messages.join("\n\n"));
        Ok(change.with_appended_message(&block))
    }
}

impl Reader for GitOriginReader {
    fn resolve(&self, reference: &str) -> Result<Revision, FerryError> {
        let reference = if reference.is_empty() {
            self.main_ref.as_str()
        } else {
            reference
        };
        self.fetch_origin()?;
        // "HEAD" must mean the origin's HEAD, not the cache repo's own
        // (possibly differently-named) unborn default branch.
        let lookup = if reference == "HEAD" {
            self.repo
                .fetch(
                    &["+HEAD:refs/ferry/origin-head".to_owned()],
                    &FetchOptions {
                        force: true,
                        ..FetchOptions::default()
                    },
                )
                .map_err(|e| FerryError::git(format!("fetching HEAD of {}", self.url), e))?;
            "refs/ferry/origin-head"
        } else {
            reference
        };
        let oid = self.git().resolve_reference(lookup).map_err(|e| {
            FerryError::git(format!("resolving '{reference}' in {}", self.url), e)
        })?;
        let entries = self
            .git()
            .log(&LogRequest::new(oid.as_str()).limit(1))
            .map_err(|e| FerryError::git(format!("reading {oid}"), e))?;
        let Some(entry) = entries.first() else {
            return Err(FerryError::Internal {
                message: format!("resolved {oid} but log returned nothing"),
            });
        };
        Ok(self.revision_from_entry(entry)?.with_context_ref(reference))
    }

    fn changes(
        &self,
        from: Option<&Revision>,
        to: &Revision,
    ) -> Result<ChangesResponse, FerryError> {
        if let Some(from) = from {
            if from.id() == to.id() {
                return Ok(ChangesResponse::Empty(EmptyReason::ToIsAncestor));
            }
            let base = self
                .git()
                .merge_base(from.id().as_str(), to.id().as_str())
                .map_err(|e| FerryError::git("computing merge-base", e))?;
            match base {
                None => return Ok(ChangesResponse::Empty(EmptyReason::UnrelatedRevisions)),
                Some(base) if base == *to.id() => {
                    return Ok(ChangesResponse::Empty(EmptyReason::ToIsAncestor));
                }
                Some(_) => {}
            }
        }

        let range = match from {
            Some(from) => format!("{}..{}", from.id(), to.id()),
            None => to.id().to_string(),
        };
        let req = LogRequest::new(range)
            .first_parent(self.first_parent)
            .include_files(true)
            .include_merge_diff(self.first_parent)
            .paths(self.glob.roots());
        let entries = self
            .git()
            .log(&req)
            .map_err(|e| FerryError::git(format!("enumerating changes of {}", self.url), e))?;

        let mut changes = Vec::new();
        for entry in &entries {
            if !self.entry_matches_glob(entry) {
                debug!(commit = %entry.commit, "skipping change outside the path filter");
                continue;
            }
            let mut change = self.change_from_entry(entry)?;
            if self.include_branch_commit_logs {
                change = self.inline_branch_logs(change)?;
            }
            changes.push(change);
        }

        if changes.is_empty() {
            return Ok(ChangesResponse::Empty(EmptyReason::NoChangesInRoots));
        }
        changes.reverse();
        Ok(ChangesResponse::Changes(changes))
    }

    fn change(&self, rev: &Revision) -> Result<Change, FerryError> {
        let entries = self
            .git()
            .log(&LogRequest::new(rev.id().as_str()).limit(1).include_files(true))
            .map_err(|e| FerryError::git(format!("reading change {}", rev.id()), e))?;
        let Some(entry) = entries.first() else {
            return Err(FerryError::validation(format!(
                "revision {} not found in {}",
                rev.id(),
                self.url
            )));
        };
        self.change_from_entry(entry)
    }

    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut ChangeVisitor<'_>,
    ) -> Result<(), FerryError> {
        let mut skip = 0;
        loop {
            let entries = self.log_page(start.id(), skip, self.visit_page_size)?;
            if entries.is_empty() {
                return Ok(());
            }
            for entry in &entries {
                if !self.entry_matches_glob(entry) {
                    continue;
                }
                let change = self.change_from_entry(entry)?;
                if visitor(&change)? == VisitOutcome::Terminate {
                    return Ok(());
                }
            }
            skip += entries.len();
        }
    }

    fn find_baselines_without_label(
        &self,
        start: &Revision,
        label: &str,
        limit: usize,
    ) -> Result<Vec<Revision>, FerryError> {
        let mut found = Vec::new();
        // Skip the starting revision itself; it is the change under review.
        let mut skip = 1;
        loop {
            let entries = self.log_page(start.id(), skip, self.visit_page_size)?;
            if entries.is_empty() {
                return Ok(found);
            }
            for entry in &entries {
                if labels::trailer_block(&entry.body).last(label).is_none() {
                    found.push(self.revision_from_entry(entry)?);
                    if found.len() >= limit {
                        return Ok(found);
                    }
                }
            }
            skip += entries.len();
        }
    }

    fn checkout(&self, rev: &Revision, dir: &Path) -> Result<(), FerryError> {
        match &self.origin_rebase_ref {
            None => self
                .git()
                .materialize_tree(rev.id().as_str(), dir)
                .map_err(|e| FerryError::git(format!("checking out {}", rev.id()), e)),
            Some(rebase_ref) => {
                let onto = self.git().resolve_reference(rebase_ref).map_err(|e| {
                    FerryError::git(format!("resolving rebase ref '{rebase_ref}'"), e)
                })?;
                let scratch_dir = tempfile::TempDir::new()?;
                let scratch = GitRepo::init(scratch_dir.path(), self.git().env().clone())
                    .map_err(|e| FerryError::git("initializing rebase scratch repo", e))?;
                scratch
                    .fetch(
                        &self.git().git_dir().display().to_string(),
                        &["+refs/heads/*:refs/heads/*".to_owned()],
                        &FetchOptions {
                            force: true,
                            ..FetchOptions::default()
                        },
                    )
                    .map_err(|e| FerryError::git("fetching into rebase scratch repo", e))?;
                scratch
                    .force_checkout(rev.id().as_str())
                    .map_err(|e| FerryError::git(format!("checking out {}", rev.id()), e))?;
                scratch.rebase(onto.as_str()).map_err(|e| {
                    FerryError::git(
                        format!("rebasing {} onto {rebase_ref} before checkout", rev.id()),
                        e,
                    )
                })?;
                workdir::copy_tree(scratch_dir.path(), dir, &Glob::all_files())?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_git::{CommitRequest, GitEnv};
    use tempfile::TempDir;

    fn test_env() -> GitEnv {
        GitEnv::new()
            .with("GIT_AUTHOR_NAME", "Ann Author")
            .with("GIT_AUTHOR_EMAIL", "ann@example.com")
            .with("GIT_COMMITTER_NAME", "Carl Committer")
            .with("GIT_COMMITTER_EMAIL", "carl@example.com")
    }

    /// An upstream repo with three commits: a.txt, docs/d.md, a.txt again.
    fn upstream() -> (TempDir, GitRepo, Vec<GitOid>) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::init(dir.path(), test_env()).unwrap();
        let mut oids = Vec::new();

        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        repo.add_all().unwrap();
        oids.push(repo.commit(&CommitRequest::new("add a\n")).unwrap());

        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/d.md"), "doc\n").unwrap();
        repo.add_all().unwrap();
        oids.push(repo.commit(&CommitRequest::new("add docs\n")).unwrap());

        std::fs::write(dir.path().join("a.txt"), "two\n").unwrap();
        repo.add_all().unwrap();
        oids.push(repo.commit(&CommitRequest::new("update a\n")).unwrap());

        (dir, repo, oids)
    }

    fn origin_for(dir: &TempDir, cache_root: &TempDir) -> GitOrigin {
        let cache = Arc::new(RepoCache::new(cache_root.path(), test_env()).unwrap());
        GitOrigin::new(cache, dir.path().display().to_string(), "HEAD")
    }

    #[test]
    fn resolve_and_enumerate_all_files() {
        let (up_dir, _up, oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let reader = origin.reader(&Glob::all_files()).unwrap();

        let head = reader.resolve("HEAD").unwrap();
        assert_eq!(head.id(), &oids[2]);
        assert!(head.author().is_some());
        assert!(head.timestamp().is_some());

        let first = reader.resolve(oids[0].as_str()).unwrap();
        let response = reader.changes(Some(&first), &head).unwrap();
        let changes = response.changes().unwrap();
        assert_eq!(changes.len(), 2, "oldest-first (from, to]");
        assert_eq!(changes[0].id(), &oids[1]);
        assert_eq!(changes[1].id(), &oids[2]);
    }

    #[test]
    fn changes_filtered_by_glob() {
        let (up_dir, _up, oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let glob = Glob::new(&["docs/**".to_owned()], &[]).unwrap();
        let reader = origin.reader(&glob).unwrap();

        let head = reader.resolve("HEAD").unwrap();
        let first = reader.resolve(oids[0].as_str()).unwrap();
        let response = reader.changes(Some(&first), &head).unwrap();
        let changes = response.changes().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].id(), &oids[1]);
    }

    #[test]
    fn changes_to_is_ancestor() {
        let (up_dir, _up, oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let reader = origin.reader(&Glob::all_files()).unwrap();

        let head = reader.resolve("HEAD").unwrap();
        let first = reader.resolve(oids[0].as_str()).unwrap();
        // Walking backwards: to is an ancestor of from.
        let response = reader.changes(Some(&head), &first).unwrap();
        assert!(matches!(
            response,
            ChangesResponse::Empty(EmptyReason::ToIsAncestor)
        ));
    }

    #[test]
    fn changes_outside_roots_is_tagged_empty() {
        let (up_dir, _up, oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let glob = Glob::new(&["nothing-here/**".to_owned()], &[]).unwrap();
        let reader = origin.reader(&glob).unwrap();

        let head = reader.resolve("HEAD").unwrap();
        let first = reader.resolve(oids[0].as_str()).unwrap();
        let response = reader.changes(Some(&first), &head).unwrap();
        assert!(matches!(
            response,
            ChangesResponse::Empty(EmptyReason::NoChangesInRoots)
        ));
    }

    #[test]
    fn visit_changes_pages_and_terminates() {
        let (up_dir, _up, oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root).visit_page_size(1);
        let reader = origin.reader(&Glob::all_files()).unwrap();
        let head = reader.resolve("HEAD").unwrap();

        let mut seen = Vec::new();
        reader
            .visit_changes(&head, &mut |change| {
                seen.push(change.id().clone());
                if seen.len() == 2 {
                    Ok(VisitOutcome::Terminate)
                } else {
                    Ok(VisitOutcome::Continue)
                }
            })
            .unwrap();
        assert_eq!(seen, vec![oids[2].clone(), oids[1].clone()]);
    }

    #[test]
    fn visit_matches_changes_reversed() {
        // changes(from, to) reversed equals the visit sequence down to from.
        let (up_dir, _up, oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let reader = origin.reader(&Glob::all_files()).unwrap();
        let head = reader.resolve("HEAD").unwrap();
        let first = reader.resolve(oids[0].as_str()).unwrap();

        let mut listed: Vec<GitOid> = reader
            .changes(Some(&first), &head)
            .unwrap()
            .into_changes()
            .unwrap()
            .iter()
            .map(|c| c.id().clone())
            .collect();
        listed.reverse();

        let stop_at = first.id().clone();
        let mut visited = Vec::new();
        reader
            .visit_changes(&head, &mut |change| {
                if *change.id() == stop_at {
                    return Ok(VisitOutcome::Terminate);
                }
                visited.push(change.id().clone());
                Ok(VisitOutcome::Continue)
            })
            .unwrap();
        assert_eq!(listed, visited);
    }

    #[test]
    fn find_baselines_skips_labeled_commits() {
        let (up_dir, up, _oids) = upstream();
        std::fs::write(up_dir.path().join("a.txt"), "three\n").unwrap();
        up.add_all().unwrap();
        up.commit(&CommitRequest::new(
            "imported change\n\nGitOrigin-RevId: 0000000000000000000000000000000000000000\n",
        ))
        .unwrap();
        std::fs::write(up_dir.path().join("a.txt"), "four\n").unwrap();
        up.add_all().unwrap();
        up.commit(&CommitRequest::new("tip change\n")).unwrap();

        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let reader = origin.reader(&Glob::all_files()).unwrap();
        let head = reader.resolve("HEAD").unwrap();

        let baselines = reader
            .find_baselines_without_label(&head, GIT_ORIGIN_LABEL, 2)
            .unwrap();
        assert_eq!(baselines.len(), 2);
        // The labeled import right below the tip is skipped.
        let labeled = reader.resolve("HEAD~1").unwrap();
        assert!(!baselines.contains(&labeled));
    }

    #[test]
    fn checkout_materializes_tree() {
        let (up_dir, _up, _oids) = upstream();
        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root);
        let reader = origin.reader(&Glob::all_files()).unwrap();
        let head = reader.resolve("HEAD").unwrap();

        let work = TempDir::new().unwrap();
        reader.checkout(&head, work.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(work.path().join("a.txt")).unwrap(),
            "two\n"
        );
        assert!(work.path().join("docs/d.md").exists());
        assert!(!work.path().join(".git").exists());
    }

    #[test]
    fn merge_commit_inlines_branch_log() {
        let (up_dir, up, _oids) = upstream();
        // Build a side branch with one commit, then merge --no-ff.
        up.branch("side", Some("HEAD")).unwrap();
        up.force_checkout("side").unwrap();
        std::fs::write(up_dir.path().join("side.txt"), "side\n").unwrap();
        up.add_all().unwrap();
        up.commit(&CommitRequest::new("side work\n")).unwrap();
        let heads = up.show_ref(None).unwrap();
        let main_branch = heads
            .keys()
            .find(|k| k.ends_with("/main") || k.ends_with("/master"))
            .cloned()
            .unwrap();
        up.force_checkout(&main_branch).unwrap();
        up.merge(
            &["side".to_owned()],
            ferry_git::FfPolicy::NoFf,
            None,
            Some("Merge side"),
        )
        .unwrap();

        let cache_root = TempDir::new().unwrap();
        let origin = origin_for(&up_dir, &cache_root).include_branch_commit_logs(true);
        let reader = origin.reader(&Glob::all_files()).unwrap();
        let head = reader.resolve("HEAD").unwrap();
        let response = reader.changes(None, &head).unwrap();
        let changes = response.into_changes().unwrap();
        let merge = changes.last().unwrap();
        assert!(merge.is_merge());
        assert!(merge.message().contains(BRANCH_COMMIT_LOG_HEADING));
        assert!(merge.message().contains("side work"));
    }
}
