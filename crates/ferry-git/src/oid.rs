//! Validated git object identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::GitError;

/// A validated 40-character lowercase hex git object ID (SHA-1).
///
/// Uppercase hex is rejected on input: git itself always prints lowercase,
/// and a mixed-case id in a commit label is a sign of hand-editing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GitOid(String);

impl GitOid {
    /// Create a new `GitOid` from a string, validating format.
    ///
    /// # Errors
    /// Returns [`GitError::Validation`] unless the string is exactly 40
    /// lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, GitError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the full hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the first 12 characters, the customary abbreviated form.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }

    fn validate(s: &str) -> Result<(), GitError> {
        if s.len() != 40 {
            return Err(GitError::Validation(format!(
                "invalid object id '{s}': expected 40 hex characters, got {}",
                s.len()
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(GitError::Validation(format!(
                "invalid object id '{s}': must contain only lowercase hex characters (0-9, a-f)"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GitOid {
    type Err = GitError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for GitOid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "aabbccdd00112233aabbccdd00112233aabbccdd";

    #[test]
    fn valid_oid_roundtrips() {
        let oid = GitOid::new(SAMPLE).unwrap();
        assert_eq!(oid.as_str(), SAMPLE);
        assert_eq!(format!("{oid}"), SAMPLE);
        assert_eq!(oid.short(), &SAMPLE[..12]);
    }

    #[test]
    fn rejects_short_oid() {
        assert!(GitOid::new("abc123").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        let upper = SAMPLE.to_uppercase();
        assert!(GitOid::new(&upper).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "zzbbccdd00112233aabbccdd00112233aabbccdd";
        assert!(GitOid::new(bad).is_err());
    }

    #[test]
    fn parses_from_str() {
        let oid: GitOid = SAMPLE.parse().unwrap();
        assert_eq!(oid.as_str(), SAMPLE);
    }
}
