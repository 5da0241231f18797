//! Typed `git log` requests and output parsing.
//!
//! Log output is produced with a custom `--format` whose fields are joined by
//! `\x01` and whose records begin with `\x02`, so commit bodies containing
//! blank lines or label-like text never confuse the parser. When file lists
//! are requested (`--name-only`), the paths trail each record and are parsed
//! from the record tail.

use std::path::PathBuf;

use crate::error::GitError;
use crate::oid::GitOid;

/// Record start marker.
const RECORD_START: char = '\x02';
/// Field separator.
const FIELD_SEP: char = '\x01';

/// The `--format` string: hash, parents, author, committer, raw body.
pub(crate) const LOG_FORMAT: &str =
    "%x02%H%x01%P%x01%an%x01%ae%x01%aI%x01%cn%x01%ce%x01%cI%x01%B%x01";

/// A typed request for `git log`.
#[derive(Clone, Debug)]
pub struct LogRequest {
    /// Revision range (`"a..b"`, a single rev, or a ref name).
    pub range: String,
    /// Maximum number of entries (`-n`).
    pub limit: Option<usize>,
    /// Entries to skip before emitting (`--skip`), for paged walks.
    pub skip: Option<usize>,
    /// Follow only the first parent of merges.
    pub first_parent: bool,
    /// Include the changed-file list per commit (`--name-only`).
    pub include_files: bool,
    /// Show the first-parent diff for merges (`-m`); only meaningful
    /// together with `first_parent`, otherwise merge records repeat.
    pub include_merge_diff: bool,
    /// Restrict to commits touching these paths (appended after `--`).
    pub paths: Vec<String>,
}

impl LogRequest {
    /// A request over `range` with defaults: no limit, first-parent walk,
    /// no file lists.
    #[must_use]
    pub fn new(range: impl Into<String>) -> Self {
        Self {
            range: range.into(),
            limit: None,
            skip: None,
            first_parent: true,
            include_files: false,
            include_merge_diff: false,
            paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    #[must_use]
    pub const fn first_parent(mut self, yes: bool) -> Self {
        self.first_parent = yes;
        self
    }

    #[must_use]
    pub const fn include_files(mut self, yes: bool) -> Self {
        self.include_files = yes;
        self
    }

    #[must_use]
    pub const fn include_merge_diff(mut self, yes: bool) -> Self {
        self.include_merge_diff = yes;
        self
    }

    #[must_use]
    pub fn paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    /// Render the argument vector for `git log`.
    pub(crate) fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "log".to_owned(),
            format!("--format={LOG_FORMAT}"),
            "--no-color".to_owned(),
        ];
        if let Some(n) = self.limit {
            args.push("-n".to_owned());
            args.push(n.to_string());
        }
        if let Some(n) = self.skip {
            args.push(format!("--skip={n}"));
        }
        if self.first_parent {
            args.push("--first-parent".to_owned());
        }
        if self.include_files {
            args.push("--name-only".to_owned());
        }
        if self.include_merge_diff {
            args.push("-m".to_owned());
        }
        args.push(self.range.clone());
        if !self.paths.is_empty() {
            args.push("--".to_owned());
            args.extend(self.paths.iter().cloned());
        }
        args
    }
}

/// An author or committer identity with its timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// ISO-8601 strict date as git printed it (`%aI` / `%cI`).
    pub date: String,
}

/// One parsed `git log` record.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub commit: GitOid,
    /// Parents in git-native order (first parent first). Empty for roots.
    pub parents: Vec<GitOid>,
    pub author: Signature,
    pub committer: Signature,
    /// Raw commit body (`%B`), trailing newline trimmed.
    pub body: String,
    /// Changed files, present only when the request asked for them. For
    /// merges without `-m`, git emits no file block and this is empty.
    pub files: Option<Vec<PathBuf>>,
}

impl LogEntry {
    /// Whether this commit has more than one parent.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// The first line of the commit body.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.body.lines().next().unwrap_or_default()
    }
}

/// Parse raw `git log` output produced with [`LOG_FORMAT`].
pub(crate) fn parse_log(raw: &str, include_files: bool) -> Result<Vec<LogEntry>, GitError> {
    let mut entries = Vec::new();

    for record in raw.split(RECORD_START) {
        if record.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = record.split(FIELD_SEP).collect();
        if fields.len() < 10 {
            return Err(GitError::Command {
                command: "git log".to_owned(),
                stderr: format!(
                    "unexpected log record with {} fields (want 10)",
                    fields.len()
                ),
                exit_code: None,
            });
        }

        let commit = GitOid::new(fields[0].trim())?;
        let parents = fields[1]
            .split_whitespace()
            .map(GitOid::new)
            .collect::<Result<Vec<_>, _>>()?;

        let author = Signature {
            name: fields[2].to_owned(),
            email: fields[3].to_owned(),
            date: fields[4].to_owned(),
        };
        let committer = Signature {
            name: fields[5].to_owned(),
            email: fields[6].to_owned(),
            date: fields[7].to_owned(),
        };
        let body = fields[8].trim_end_matches('\n').to_owned();

        // Everything after the final separator is the --name-only block.
        let files = if include_files {
            let tail = fields[9..].join("\x01");
            Some(
                tail.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(PathBuf::from)
                    .collect(),
            )
        } else {
            None
        };

        entries.push(LogEntry {
            commit,
            parents,
            author,
            committer,
            body,
            files,
        });
    }

    Ok(entries)
}
