//! Path filters over relative paths, with include and exclude patterns.
//!
//! Built on `glob::Pattern` with literal separators, so `*` stays within one
//! path component and `**` crosses directories. The empty glob includes
//! nothing; [`Glob::all_files`] includes everything.

use std::path::Path;

use glob::{MatchOptions, Pattern};

use crate::error::FerryError;

const ALL_FILES_PATTERN: &str = "**";

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// A filter over repository-relative paths.
#[derive(Clone, Debug)]
pub struct Glob {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    include_sources: Vec<String>,
}

impl Glob {
    /// Build a glob from include and exclude pattern strings.
    ///
    /// # Errors
    /// [`FerryError::Validation`] on a malformed pattern.
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, FerryError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, FerryError> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        FerryError::validation(format!("invalid glob pattern '{p}': {e}"))
                    })
                })
                .collect()
        };
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
            include_sources: includes.to_vec(),
        })
    }

    /// The glob matching every path.
    #[must_use]
    pub fn all_files() -> Self {
        let includes = vec![ALL_FILES_PATTERN.to_owned()];
        Self::new(&includes, &[]).expect("the constant pattern always compiles")
    }

    /// The glob matching no path at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
            include_sources: Vec::new(),
        }
    }

    /// Whether `path` is included and not excluded.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let opts = match_options();
        let included = self
            .includes
            .iter()
            .any(|p| p.matches_path_with(path, opts));
        if !included {
            return false;
        }
        !self
            .excludes
            .iter()
            .any(|p| p.matches_path_with(path, opts))
    }

    /// Whether this is exactly the include-everything glob. Several call
    /// sites special-case it (empty-tree commits stay visible under it).
    #[must_use]
    pub fn is_all_files(&self) -> bool {
        self.excludes.is_empty()
            && self.include_sources.len() == 1
            && self.include_sources[0] == ALL_FILES_PATTERN
    }

    /// The literal directory prefixes of the include patterns, deepest
    /// meta-free components only. An empty result means "the repository
    /// root" — no path limiting is possible.
    #[must_use]
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = Vec::new();
        for source in &self.include_sources {
            let mut literal: Vec<&str> = Vec::new();
            for component in source.split('/') {
                if component.contains(['*', '?', '[', ']']) {
                    break;
                }
                literal.push(component);
            }
            let root = literal.join("/");
            if root.is_empty() {
                // One pattern reaches the repo root: no limiting at all.
                return Vec::new();
            }
            roots.push(root);
        }
        roots.sort();
        roots.dedup();
        // Drop roots nested under another root.
        let mut kept: Vec<String> = Vec::new();
        for root in roots {
            let nested = kept
                .iter()
                .any(|k| root == *k || root.starts_with(&format!("{k}/")));
            if !nested {
                kept.push(root);
            }
        }
        kept
    }

    /// The raw include pattern strings.
    #[must_use]
    pub fn include_sources(&self) -> &[String] {
        &self.include_sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn glob(includes: &[&str], excludes: &[&str]) -> Glob {
        let inc: Vec<String> = includes.iter().map(|s| (*s).to_owned()).collect();
        let exc: Vec<String> = excludes.iter().map(|s| (*s).to_owned()).collect();
        Glob::new(&inc, &exc).unwrap()
    }

    #[test]
    fn empty_glob_includes_nothing() {
        let g = Glob::empty();
        assert!(!g.matches(&PathBuf::from("a.txt")));
        assert!(!g.matches(&PathBuf::from("deep/path/file.rs")));
    }

    #[test]
    fn all_files_includes_everything() {
        let g = Glob::all_files();
        assert!(g.matches(&PathBuf::from("a.txt")));
        assert!(g.matches(&PathBuf::from("deep/path/file.rs")));
        assert!(g.is_all_files());
    }

    #[test]
    fn star_stays_in_one_component() {
        let g = glob(&["src/*.rs"], &[]);
        assert!(g.matches(&PathBuf::from("src/lib.rs")));
        assert!(!g.matches(&PathBuf::from("src/nested/mod.rs")));
    }

    #[test]
    fn double_star_crosses_components() {
        let g = glob(&["src/**"], &[]);
        assert!(g.matches(&PathBuf::from("src/lib.rs")));
        assert!(g.matches(&PathBuf::from("src/nested/deep/mod.rs")));
        assert!(!g.matches(&PathBuf::from("docs/readme.md")));
    }

    #[test]
    fn excludes_trim_includes() {
        let g = glob(&["src/**"], &["src/**/generated_*.rs"]);
        assert!(g.matches(&PathBuf::from("src/lib.rs")));
        assert!(!g.matches(&PathBuf::from("src/proto/generated_api.rs")));
    }

    #[test]
    fn narrower_glob_is_not_all_files() {
        assert!(!glob(&["src/**"], &[]).is_all_files());
        assert!(!glob(&["**"], &["vendor/**"]).is_all_files());
    }

    #[test]
    fn roots_extracts_literal_prefixes() {
        let g = glob(&["src/**", "docs/manual/*.md"], &[]);
        assert_eq!(g.roots(), vec!["docs/manual".to_owned(), "src".to_owned()]);
    }

    #[test]
    fn roots_collapse_nested() {
        let g = glob(&["src/**", "src/deep/*.rs"], &[]);
        assert_eq!(g.roots(), vec!["src".to_owned()]);
    }

    #[test]
    fn root_reaching_pattern_disables_limiting() {
        let g = glob(&["**", "src/**"], &[]);
        assert!(g.roots().is_empty());
    }

    #[test]
    fn invalid_pattern_is_validation_error() {
        let err = Glob::new(&["src/[".to_owned()], &[]).unwrap_err();
        assert!(matches!(err, FerryError::Validation { .. }));
    }
}
