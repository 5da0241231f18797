//! Authoring policy: which author a destination commit carries.

use crate::model::Author;

/// How origin authors map to destination authors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authoring {
    /// Keep the origin author as-is.
    PassThru,
    /// Replace every author with a fixed one.
    Overwrite(Author),
    /// Keep authors whose email is on the list; everyone else becomes the
    /// default author.
    Allowlist {
        default: Author,
        allowed: Vec<String>,
    },
}

impl Authoring {
    /// The destination author for a change authored by `origin`.
    #[must_use]
    pub fn resolve(&self, origin: &Author) -> Author {
        match self {
            Self::PassThru => origin.clone(),
            Self::Overwrite(author) => author.clone(),
            Self::Allowlist { default, allowed } => {
                if allowed.iter().any(|email| email == &origin.email) {
                    origin.clone()
                } else {
                    default.clone()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Author {
        Author::new("Ann", "ann@example.com")
    }

    #[test]
    fn pass_thru_keeps_author() {
        assert_eq!(Authoring::PassThru.resolve(&origin()), origin());
    }

    #[test]
    fn overwrite_replaces_author() {
        let fixed = Author::new("Bot", "bot@example.com");
        assert_eq!(Authoring::Overwrite(fixed.clone()).resolve(&origin()), fixed);
    }

    #[test]
    fn allowlist_admits_listed_email() {
        let policy = Authoring::Allowlist {
            default: Author::new("Bot", "bot@example.com"),
            allowed: vec!["ann@example.com".to_owned()],
        };
        assert_eq!(policy.resolve(&origin()), origin());
        let other = Author::new("Eve", "eve@example.com");
        assert_eq!(policy.resolve(&other).email, "bot@example.com");
    }
}
