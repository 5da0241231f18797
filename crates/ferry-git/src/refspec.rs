//! Refspec parsing, matching, and coverage tests.
//!
//! A refspec maps source refs to destination refs (`src:dst`, optional `+`
//! prefix for forced updates). Each side may carry at most one `*` wildcard,
//! and either both sides carry one or neither does. Coverage (`covers`) is
//! what mirror jobs use to validate that an action's refspec stays inside
//! the mirror's declared set.

use std::fmt;
use std::str::FromStr;

use crate::error::GitError;

/// A parsed git refspec.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Refspec {
    /// Allow non-fast-forward updates (`+` prefix).
    pub force: bool,
    /// Source pattern; empty means "delete the destination ref".
    pub source: String,
    /// Destination pattern.
    pub destination: String,
}

impl Refspec {
    /// Parse a refspec string.
    ///
    /// # Errors
    /// [`GitError::Validation`] for an empty spec, unbalanced wildcards, or
    /// more than one `*` per side.
    pub fn parse(spec: &str) -> Result<Self, GitError> {
        let (force, rest) = match spec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        if rest.is_empty() {
            return Err(GitError::Validation(format!("empty refspec '{spec}'")));
        }

        let (source, destination) = match rest.split_once(':') {
            Some((src, dst)) => (src.to_owned(), dst.to_owned()),
            // A lone ref fetches into FETCH_HEAD; destination mirrors source.
            None => (rest.to_owned(), rest.to_owned()),
        };

        if destination.is_empty() {
            return Err(GitError::Validation(format!(
                "refspec '{spec}' has an empty destination"
            )));
        }
        for side in [&source, &destination] {
            if side.matches('*').count() > 1 {
                return Err(GitError::Validation(format!(
                    "refspec '{spec}' has more than one wildcard per side"
                )));
            }
        }
        let src_wild = source.contains('*');
        let dst_wild = destination.contains('*');
        if !source.is_empty() && src_wild != dst_wild {
            return Err(GitError::Validation(format!(
                "refspec '{spec}' mixes wildcard and literal sides"
            )));
        }

        Ok(Self {
            force,
            source,
            destination,
        })
    }

    /// Whether `refname` matches the source pattern.
    #[must_use]
    pub fn matches_source(&self, refname: &str) -> bool {
        pattern_matches(&self.source, refname)
    }

    /// Map a source refname to its destination refname, when it matches.
    #[must_use]
    pub fn map(&self, refname: &str) -> Option<String> {
        if !self.matches_source(refname) {
            return None;
        }
        if let Some(star) = self.source.find('*') {
            let prefix = &self.source[..star];
            let suffix = &self.source[star + 1..];
            let middle = &refname[prefix.len()..refname.len() - suffix.len()];
            Some(self.destination.replacen('*', middle, 1))
        } else {
            Some(self.destination.clone())
        }
    }

    /// Whether every ref pair `other` can touch is also touched by `self`.
    ///
    /// A literal is covered by a matching literal or wildcard; a wildcard is
    /// covered only by a wildcard whose prefix/suffix contain it.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        side_covers(&self.source, &other.source)
            && side_covers(&self.destination, &other.destination)
    }

    /// The same mapping in the opposite direction.
    #[must_use]
    pub fn invert(&self) -> Self {
        Self {
            force: self.force,
            source: self.destination.clone(),
            destination: self.source.clone(),
        }
    }
}

fn side_covers(cover: &str, inner: &str) -> bool {
    match (cover.find('*'), inner.find('*')) {
        (None, None) => cover == inner,
        (Some(_), None) => pattern_matches(cover, inner),
        (None, Some(_)) => false,
        (Some(c), Some(i)) => {
            let (c_pre, c_suf) = (&cover[..c], &cover[c + 1..]);
            let (i_pre, i_suf) = (&inner[..i], &inner[i + 1..]);
            i_pre.starts_with(c_pre) && i_suf.ends_with(c_suf)
        }
    }
}

/// Single-`*` glob match over a full refname.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.find('*') {
        Some(star) => {
            let prefix = &pattern[..star];
            let suffix = &pattern[star + 1..];
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => pattern == name,
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force {
            write!(f, "+")?;
        }
        write!(f, "{}:{}", self.source, self.destination)
    }
}

impl FromStr for Refspec {
    type Err = GitError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
