//! Typed facade over the `git` command line.
//!
//! A [`GitRepo`] addresses either a bare repository (`--git-dir` only) or a
//! detached work-tree (`--git-dir` plus `--work-tree`). Every operation
//! spawns one child process with a sanitized environment and a wall-clock
//! deadline, and maps the result to typed values — raw strings escape only
//! through [`GitRepo::run`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::env::GitEnv;
use crate::error::{GitError, PathList};
use crate::exec::{ExecResult, run_with_deadline};
use crate::log::{LogEntry, LogRequest, parse_log};
use crate::oid::GitOid;

/// Default deadline for a single git subprocess.
pub const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(15 * 60);

// ---------------------------------------------------------------------------
// Option structs
// ---------------------------------------------------------------------------

/// Options for [`GitRepo::fetch`].
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Delete local refs no longer present on the remote.
    pub prune: bool,
    /// Allow non-fast-forward ref updates.
    pub force: bool,
    /// Shallow fetch depth.
    pub depth: Option<u32>,
}

/// Options for [`GitRepo::push`].
#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    /// Force-push (`--force`).
    pub force: bool,
    /// Server push options (`--push-option=<opt>`).
    pub push_options: Vec<String>,
    /// Validate only; the remote refs are not updated.
    pub dry_run: bool,
}

/// Fast-forward policy for [`GitRepo::merge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfPolicy {
    /// Fast-forward when possible (`--ff`).
    Ff,
    /// Refuse to create a merge commit (`--ff-only`).
    FfOnly,
    /// Always create a merge commit (`--no-ff`).
    NoFf,
}

impl FfPolicy {
    const fn flag(self) -> &'static str {
        match self {
            Self::Ff => "--ff",
            Self::FfOnly => "--ff-only",
            Self::NoFf => "--no-ff",
        }
    }
}

/// A commit to be created by [`GitRepo::commit`].
#[derive(Clone, Debug, Default)]
pub struct CommitRequest {
    /// Full commit message, written verbatim.
    pub message: String,
    /// Author `(name, email)`; the committer identity comes from the
    /// repository environment. `None` means author = committer.
    pub author: Option<(String, String)>,
    /// Author date, ISO-8601.
    pub author_date: Option<String>,
    /// Amend the current HEAD commit.
    pub amend: bool,
    /// Permit a commit that changes no files.
    pub allow_empty: bool,
}

impl CommitRequest {
    /// A plain commit of `message` with defaults for everything else.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// One entry of a `--name-status` diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    /// Status letter (`A`, `M`, `D`, `R`).
    pub status: char,
    /// Path after the change (the rename target for `R`).
    pub path: PathBuf,
    /// Rename source, for `R` entries only.
    pub from_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// GitRepo
// ---------------------------------------------------------------------------

/// Handle on one git repository (bare or with a detached work-tree).
#[derive(Clone, Debug)]
pub struct GitRepo {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    env: GitEnv,
    timeout: Duration,
}

impl GitRepo {
    /// Wrap an existing bare repository.
    #[must_use]
    pub fn bare(git_dir: impl Into<PathBuf>, env: GitEnv) -> Self {
        Self {
            git_dir: git_dir.into(),
            work_tree: None,
            env,
            timeout: DEFAULT_SUBPROCESS_TIMEOUT,
        }
    }

    /// Initialize a new bare repository at `path`.
    ///
    /// # Errors
    /// Fails when the directory cannot be created or `git init` fails.
    pub fn init_bare(path: &Path, env: GitEnv) -> Result<Self, GitError> {
        std::fs::create_dir_all(path)?;
        let mut cmd = Command::new("git");
        env.apply(&mut cmd);
        cmd.arg("init").arg("--bare").arg(path);
        let rendered = format!("git init --bare {}", path.display());
        let res = run_with_deadline(cmd, &rendered, None, DEFAULT_SUBPROCESS_TIMEOUT)?;
        if !res.success {
            return Err(GitError::Command {
                command: rendered,
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            });
        }
        Ok(Self::bare(path, env))
    }

    /// Initialize a new repository with a work-tree at `path`.
    ///
    /// # Errors
    /// Fails when the directory cannot be created or `git init` fails.
    pub fn init(path: &Path, env: GitEnv) -> Result<Self, GitError> {
        std::fs::create_dir_all(path)?;
        let mut cmd = Command::new("git");
        env.apply(&mut cmd);
        cmd.arg("init").arg(path);
        let rendered = format!("git init {}", path.display());
        let res = run_with_deadline(cmd, &rendered, None, DEFAULT_SUBPROCESS_TIMEOUT)?;
        if !res.success {
            return Err(GitError::Command {
                command: rendered,
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            });
        }
        Ok(Self {
            git_dir: path.join(".git"),
            work_tree: Some(path.to_path_buf()),
            env,
            timeout: DEFAULT_SUBPROCESS_TIMEOUT,
        })
    }

    /// Clone `url` at `reference` (branch, tag, or sha1) into `target`.
    ///
    /// Implemented as init + fetch + checkout so a bare sha1 works against
    /// servers that allow fetching unadvertised objects; when the direct
    /// fetch is rejected, all heads and tags are fetched and the reference
    /// resolved locally.
    ///
    /// # Errors
    /// Propagates fetch classification; an unresolvable `reference` is
    /// [`GitError::CannotResolveRevision`].
    pub fn clone_into(
        url: &str,
        target: &Path,
        reference: &str,
        env: GitEnv,
    ) -> Result<Self, GitError> {
        let repo = Self::init(target, env)?;
        repo.config_set("remote.origin.url", url)?;
        match repo.fetch("origin", &[reference.to_owned()], &FetchOptions::default()) {
            Ok(()) => repo.force_checkout("FETCH_HEAD")?,
            Err(err) if err.is_transient() => return Err(err),
            Err(_) => {
                repo.fetch(
                    "origin",
                    &[
                        "+refs/heads/*:refs/remotes/origin/*".to_owned(),
                        "+refs/tags/*:refs/tags/*".to_owned(),
                    ],
                    &FetchOptions::default(),
                )?;
                repo.force_checkout(reference)?;
            }
        }
        Ok(repo)
    }

    /// Re-address the same git dir through a different work-tree.
    #[must_use]
    pub fn with_work_tree(&self, work_tree: &Path) -> Self {
        Self {
            git_dir: self.git_dir.clone(),
            work_tree: Some(work_tree.to_path_buf()),
            env: self.env.clone(),
            timeout: self.timeout,
        }
    }

    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    #[must_use]
    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn env_mut(&mut self) -> &mut GitEnv {
        &mut self.env
    }

    #[must_use]
    pub fn env(&self) -> &GitEnv {
        &self.env
    }

    // -- invocation plumbing --

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("git");
        self.env.apply(&mut cmd);
        cmd.arg("--git-dir").arg(&self.git_dir);
        if let Some(wt) = &self.work_tree {
            cmd.arg("--work-tree").arg(wt);
            cmd.current_dir(wt);
        }
        cmd
    }

    fn rendered<S: AsRef<str>>(args: &[S]) -> String {
        let joined: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        format!("git {}", joined.join(" "))
    }

    fn exec<S: AsRef<str>>(
        &self,
        args: &[S],
        extra_env: &[(&str, String)],
        stdin: Option<&[u8]>,
    ) -> Result<ExecResult, GitError> {
        let mut cmd = self.base_command();
        for a in args {
            cmd.arg(a.as_ref());
        }
        for (key, value) in extra_env {
            cmd.env(key, value);
        }
        let rendered = Self::rendered(args);
        debug!(command = %rendered, "spawning git");
        run_with_deadline(cmd, &rendered, stdin, self.timeout)
    }

    fn checked<S: AsRef<str>>(
        &self,
        args: &[S],
        extra_env: &[(&str, String)],
        stdin: Option<&[u8]>,
    ) -> Result<ExecResult, GitError> {
        let res = self.exec(args, extra_env, stdin)?;
        if res.success {
            Ok(res)
        } else {
            Err(GitError::Command {
                command: Self::rendered(args),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            })
        }
    }

    /// Run an arbitrary git command and return its stdout.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn run(&self, args: &[&str]) -> Result<String, GitError> {
        Ok(self.checked(args, &[], None)?.stdout)
    }

    /// Alias of [`GitRepo::run`] for callers scripting raw git commands.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn simple_command(&self, args: &[&str]) -> Result<String, GitError> {
        self.run(args)
    }

    // -- config --

    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.checked(&["config", key, value], &[], None)?;
        Ok(())
    }

    /// Unset a config key; missing keys are not an error.
    ///
    /// # Errors
    /// [`GitError::Command`] for failures other than "not set" (exit 5).
    pub fn config_unset(&self, key: &str) -> Result<(), GitError> {
        let res = self.exec(&["config", "--unset", key], &[], None)?;
        if res.success || res.exit_code == Some(5) {
            Ok(())
        } else {
            Err(GitError::Command {
                command: format!("git config --unset {key}"),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            })
        }
    }

    // -- remote transfer --

    /// Fetch `refspecs` from `remote` (a remote name or a URL).
    ///
    /// # Errors
    /// Failures are classified: network-shaped → [`GitError::Transient`],
    /// auth/refspec → [`GitError::Validation`], otherwise
    /// [`GitError::Command`].
    pub fn fetch(
        &self,
        remote: &str,
        refspecs: &[String],
        opts: &FetchOptions,
    ) -> Result<(), GitError> {
        let mut args: Vec<String> = vec!["fetch".to_owned()];
        if opts.prune {
            args.push("--prune".to_owned());
        }
        if opts.force {
            args.push("--force".to_owned());
        }
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={depth}"));
        }
        args.push(remote.to_owned());
        args.extend(refspecs.iter().cloned());

        let res = self.exec(&args, &[], None)?;
        if res.success {
            Ok(())
        } else {
            Err(GitError::classify_remote(
                Self::rendered(&args),
                res.stderr.trim().to_owned(),
                res.exit_code,
            ))
        }
    }

    /// Push `refspecs` to `remote`.
    ///
    /// # Errors
    /// A remote rejection because local history is behind surfaces as
    /// [`GitError::NonFastForward`]; other failures are classified like
    /// [`GitRepo::fetch`].
    pub fn push(
        &self,
        remote: &str,
        refspecs: &[String],
        opts: &PushOptions,
    ) -> Result<(), GitError> {
        let mut args: Vec<String> = vec!["push".to_owned()];
        if opts.force {
            args.push("--force".to_owned());
        }
        if opts.dry_run {
            args.push("--dry-run".to_owned());
        }
        for opt in &opts.push_options {
            args.push(format!("--push-option={opt}"));
        }
        args.push(remote.to_owned());
        args.extend(refspecs.iter().cloned());

        let res = self.exec(&args, &[], None)?;
        if res.success {
            return Ok(());
        }
        let stderr = res.stderr.trim().to_owned();
        if stderr.contains("non-fast-forward")
            || stderr.contains("fetch first")
            || stderr.contains("[rejected]")
        {
            return Err(GitError::NonFastForward {
                refspec: refspecs.join(" "),
            });
        }
        Err(GitError::classify_remote(
            Self::rendered(&args),
            stderr,
            res.exit_code,
        ))
    }

    // -- refs and revisions --

    /// Resolve `reference` (branch, tag, remote-tracking ref, `HEAD~N`, or a
    /// sha1 prefix) to the commit it names.
    ///
    /// # Errors
    /// [`GitError::CannotResolveRevision`] when git cannot resolve it or the
    /// resolved object is not a commit.
    pub fn resolve_reference(&self, reference: &str) -> Result<GitOid, GitError> {
        let spec = format!("{reference}^{{commit}}");
        let res = self.exec(&["rev-parse", "--verify", "--quiet", &spec], &[], None)?;
        if !res.success {
            let detail = if res.stderr.trim().is_empty() {
                "unknown revision or not a commit".to_owned()
            } else {
                res.stderr.trim().to_owned()
            };
            return Err(GitError::CannotResolveRevision {
                reference: reference.to_owned(),
                detail,
            });
        }
        GitOid::new(res.stdout.trim()).map_err(|_| GitError::CannotResolveRevision {
            reference: reference.to_owned(),
            detail: format!("rev-parse returned '{}'", res.stdout.trim()),
        })
    }

    /// Whether a fully-qualified ref (`refs/...`) exists.
    ///
    /// # Errors
    /// [`GitError::Command`] on git failures other than "missing ref".
    pub fn ref_exists(&self, name: &str) -> Result<bool, GitError> {
        let res = self.exec(&["show-ref", "--verify", "--quiet", name], &[], None)?;
        if res.success {
            Ok(true)
        } else if res.exit_code == Some(1) {
            Ok(false)
        } else {
            Err(GitError::Command {
                command: format!("git show-ref --verify {name}"),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            })
        }
    }

    /// All refs, optionally filtered by a `show-ref` pattern, as
    /// refname → commit. An empty repository yields an empty map.
    ///
    /// # Errors
    /// [`GitError::Command`] when git fails for a reason other than
    /// "no refs".
    pub fn show_ref(&self, pattern: Option<&str>) -> Result<BTreeMap<String, GitOid>, GitError> {
        let mut args = vec!["show-ref"];
        if let Some(p) = pattern {
            args.push(p);
        }
        let res = self.exec(&args, &[], None)?;
        if !res.success {
            // show-ref exits 1 with no output when nothing matches.
            if res.exit_code == Some(1) && res.stderr.trim().is_empty() {
                return Ok(BTreeMap::new());
            }
            return Err(GitError::Command {
                command: Self::rendered(&args),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            });
        }
        let mut refs = BTreeMap::new();
        for line in res.stdout.lines() {
            if let Some((oid, name)) = line.trim().split_once(' ') {
                refs.insert(name.to_owned(), GitOid::new(oid)?);
            }
        }
        Ok(refs)
    }

    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn update_ref(&self, name: &str, target: &str) -> Result<(), GitError> {
        self.checked(&["update-ref", name, target], &[], None)?;
        Ok(())
    }

    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        self.checked(&["update-ref", "-d", name], &[], None)?;
        Ok(())
    }

    /// Create `name` pointing at `starting_point` (or HEAD), without
    /// checking it out. Requires git ≥ 2.22.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn branch(&self, name: &str, starting_point: Option<&str>) -> Result<(), GitError> {
        let mut args = vec!["branch", name];
        if let Some(start) = starting_point {
            args.push(start);
        }
        self.checked(&args, &[], None)?;
        Ok(())
    }

    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn force_checkout(&self, reference: &str) -> Result<(), GitError> {
        self.checked(&["checkout", "-f", reference], &[], None)?;
        Ok(())
    }

    /// Check out only `paths` from `reference` into the work-tree and index.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn checkout_paths(&self, reference: &str, paths: &[PathBuf]) -> Result<(), GitError> {
        let mut args: Vec<String> = vec![
            "checkout".to_owned(),
            "-f".to_owned(),
            reference.to_owned(),
            "--".to_owned(),
        ];
        args.extend(paths.iter().map(|p| p.display().to_string()));
        self.checked(&args, &[], None)?;
        Ok(())
    }

    // -- index and commits --

    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn add_all(&self) -> Result<(), GitError> {
        self.checked(&["add", "--all"], &[], None)?;
        Ok(())
    }

    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn add(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        let mut args: Vec<String> = vec!["add".to_owned(), "--".to_owned()];
        args.extend(paths.iter().map(|p| p.display().to_string()));
        self.checked(&args, &[], None)?;
        Ok(())
    }

    /// Whether the index matches HEAD (nothing staged).
    ///
    /// # Errors
    /// [`GitError::Command`] when git fails for a reason other than a
    /// non-empty diff.
    pub fn staged_is_empty(&self) -> Result<bool, GitError> {
        let res = self.exec(&["diff", "--cached", "--quiet"], &[], None)?;
        if res.success {
            Ok(true)
        } else if res.exit_code == Some(1) {
            Ok(false)
        } else {
            Err(GitError::Command {
                command: "git diff --cached --quiet".to_owned(),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            })
        }
    }

    /// Create a commit from the index; returns the new HEAD commit.
    ///
    /// The committer identity comes from the repository environment
    /// (`GIT_COMMITTER_*`) or local config; `req.author` overrides the
    /// author side only. The message is passed verbatim on stdin.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero (including an empty
    /// commit without `allow_empty`).
    pub fn commit(&self, req: &CommitRequest) -> Result<GitOid, GitError> {
        let mut extra_env: Vec<(&str, String)> = Vec::new();
        if let Some((name, email)) = &req.author {
            extra_env.push(("GIT_AUTHOR_NAME", name.clone()));
            extra_env.push(("GIT_AUTHOR_EMAIL", email.clone()));
        }
        if let Some(date) = &req.author_date {
            extra_env.push(("GIT_AUTHOR_DATE", date.clone()));
        }

        let mut args = vec!["commit", "-F", "-"];
        if req.amend {
            args.push("--amend");
        }
        if req.allow_empty {
            args.push("--allow-empty");
        }
        self.checked(&args, &extra_env, Some(req.message.as_bytes()))?;
        self.resolve_reference("HEAD")
    }

    /// Create a commit object directly from a tree, without touching the
    /// index. Used for synthetic merge commits whose tree must equal an
    /// existing commit's tree.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn commit_tree(
        &self,
        tree: &str,
        parents: &[GitOid],
        message: &str,
        author: Option<(&str, &str)>,
    ) -> Result<GitOid, GitError> {
        let mut extra_env: Vec<(&str, String)> = Vec::new();
        if let Some((name, email)) = author {
            extra_env.push(("GIT_AUTHOR_NAME", name.to_owned()));
            extra_env.push(("GIT_AUTHOR_EMAIL", email.to_owned()));
        }
        let mut args: Vec<String> = vec!["commit-tree".to_owned(), tree.to_owned()];
        for parent in parents {
            args.push("-p".to_owned());
            args.push(parent.as_str().to_owned());
        }
        let res = self.checked(&args, &extra_env, Some(message.as_bytes()))?;
        GitOid::new(res.stdout.trim())
    }

    /// The tree object of a commit (`<rev>^{tree}`).
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn tree_of(&self, rev: &str) -> Result<String, GitError> {
        let spec = format!("{rev}^{{tree}}");
        Ok(self.run(&["rev-parse", &spec])?.trim().to_owned())
    }

    /// The raw message body of a commit (`%B`).
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn commit_message(&self, rev: &str) -> Result<String, GitError> {
        self.run(&["log", "-1", "--format=%B", rev])
    }

    /// Parents of a commit, first parent first.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn commit_parents(&self, rev: &str) -> Result<Vec<GitOid>, GitError> {
        let out = self.run(&["log", "-1", "--format=%P", rev])?;
        out.split_whitespace().map(GitOid::new).collect()
    }

    // -- history --

    /// Run a typed `git log` request.
    ///
    /// Entries come back reverse-chronological; merge parents keep
    /// git-native order.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero or emits an
    /// unparseable record.
    pub fn log(&self, req: &LogRequest) -> Result<Vec<LogEntry>, GitError> {
        let args = req.to_args();
        let res = self.exec(&args, &[], None)?;
        if !res.success {
            return Err(GitError::Command {
                command: Self::rendered(&args),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            });
        }
        parse_log(&res.stdout, req.include_files)
    }

    /// Best common ancestor of `a` and `b`, or `None` for unrelated
    /// histories.
    ///
    /// # Errors
    /// [`GitError::Command`] on failures other than "no common ancestor".
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<GitOid>, GitError> {
        let res = self.exec(&["merge-base", a, b], &[], None)?;
        if res.success {
            Ok(Some(GitOid::new(res.stdout.trim())?))
        } else if res.exit_code == Some(1) {
            Ok(None)
        } else {
            Err(GitError::Command {
                command: format!("git merge-base {a} {b}"),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            })
        }
    }

    /// `diff --name-status` between two revisions.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn diff_name_status(&self, from: &str, to: &str) -> Result<Vec<FileStatus>, GitError> {
        let out = self.run(&["diff", "--name-status", from, to])?;
        Ok(parse_name_status(&out))
    }

    // -- tree surgery --

    /// Check `reference`'s tree out into `target` without disturbing the
    /// repository's own index (a scratch index file is used and removed).
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn materialize_tree(&self, reference: &str, target: &Path) -> Result<(), GitError> {
        std::fs::create_dir_all(target)?;
        let scratch = self.with_work_tree(target);
        let index = self
            .git_dir
            .join(format!("ferry-index-{}", std::process::id()));
        let result = scratch.checked(
            &["checkout", "-f", reference, "--", "."],
            &[("GIT_INDEX_FILE", index.display().to_string())],
            None,
        );
        let _ = std::fs::remove_file(&index);
        result.map(|_| ())
    }

    // -- merge / rebase / cherry-pick --

    /// Merge `heads` into the current branch.
    ///
    /// # Errors
    /// Conflicts abort the merge and surface as
    /// [`GitError::RebaseConflict`] carrying the conflicting paths.
    pub fn merge(
        &self,
        heads: &[String],
        policy: FfPolicy,
        strategy: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), GitError> {
        let mut args: Vec<String> = vec![
            "merge".to_owned(),
            "--no-edit".to_owned(),
            policy.flag().to_owned(),
        ];
        if let Some(s) = strategy {
            args.push("-s".to_owned());
            args.push(s.to_owned());
        }
        if let Some(m) = message {
            args.push("-m".to_owned());
            args.push(m.to_owned());
        }
        args.extend(heads.iter().cloned());

        let res = self.exec(&args, &[], None)?;
        if res.success {
            return Ok(());
        }
        self.fail_conflicted("merge", &["merge", "--abort"], &args, res)
    }

    /// Rebase the current branch onto `upstream`.
    ///
    /// # Errors
    /// Conflicts abort the rebase and surface as
    /// [`GitError::RebaseConflict`].
    pub fn rebase(&self, upstream: &str) -> Result<(), GitError> {
        let args = vec!["rebase".to_owned(), upstream.to_owned()];
        let res = self.exec(&args, &[], None)?;
        if res.success {
            return Ok(());
        }
        self.fail_conflicted("rebase", &["rebase", "--abort"], &args, res)
    }

    /// Cherry-pick `ranges` onto the current branch. With `record_origin`,
    /// each resulting message gains the standard
    /// `(cherry picked from commit <sha>)` footer.
    ///
    /// # Errors
    /// Conflicts abort the cherry-pick and surface as
    /// [`GitError::RebaseConflict`].
    pub fn cherry_pick(&self, ranges: &[String], record_origin: bool) -> Result<(), GitError> {
        let mut args: Vec<String> = vec!["cherry-pick".to_owned()];
        if record_origin {
            args.push("-x".to_owned());
        }
        args.extend(ranges.iter().cloned());

        let res = self.exec(&args, &[], None)?;
        if res.success {
            return Ok(());
        }
        self.fail_conflicted("cherry-pick", &["cherry-pick", "--abort"], &args, res)
    }

    /// Paths currently in a conflicted (unmerged) state.
    ///
    /// # Errors
    /// [`GitError::Command`] when git exits non-zero.
    pub fn conflicted_paths(&self) -> Result<Vec<PathBuf>, GitError> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn fail_conflicted(
        &self,
        operation: &str,
        abort_args: &[&str],
        args: &[String],
        res: ExecResult,
    ) -> Result<(), GitError> {
        let conflicts = self.conflicted_paths().unwrap_or_default();
        let _ = self.exec(abort_args, &[], None);
        if conflicts.is_empty() {
            Err(GitError::Command {
                command: Self::rendered(args),
                stderr: res.stderr.trim().to_owned(),
                exit_code: res.exit_code,
            })
        } else {
            Err(GitError::RebaseConflict {
                operation: operation.to_owned(),
                paths: PathList(conflicts),
            })
        }
    }

    // -- credentials --

    /// Ask git's credential machinery for the credentials of `url`.
    ///
    /// # Errors
    /// [`GitError::Command`] when `git credential fill` fails, and
    /// [`GitError::Validation`] when it yields no username/password pair.
    pub fn credential_fill(&self, url: &str) -> Result<crate::credentials::Credential, GitError> {
        crate::credentials::fill(self, url)
    }

    pub(crate) fn exec_with_stdin(
        &self,
        args: &[&str],
        stdin: &[u8],
    ) -> Result<ExecResult, GitError> {
        self.checked(args, &[], Some(stdin))
    }
}

/// Parse `git diff --name-status` output. Rename entries carry both sides.
fn parse_name_status(output: &str) -> Vec<FileStatus> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split('\t');
        let Some(status_field) = parts.next() else {
            continue;
        };
        let Some(status) = status_field.chars().next() else {
            continue;
        };
        match status {
            'A' | 'M' | 'D' | 'T' => {
                if let Some(path) = parts.next() {
                    entries.push(FileStatus {
                        status: if status == 'T' { 'M' } else { status },
                        path: PathBuf::from(path),
                        from_path: None,
                    });
                }
            }
            'R' | 'C' => {
                if let (Some(old), Some(new)) = (parts.next(), parts.next()) {
                    entries.push(FileStatus {
                        status: 'R',
                        path: PathBuf::from(new),
                        from_path: Some(PathBuf::from(old)),
                    });
                }
            }
            _ => {}
        }
    }
    entries
}
