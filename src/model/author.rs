//! Commit author identities.

use std::fmt;

use crate::error::FerryError;

/// A `name <email>` identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Parse the standard `Name <email>` form.
    ///
    /// # Errors
    /// [`FerryError::Validation`] when the angle brackets are missing or the
    /// name is empty.
    pub fn parse(s: &str) -> Result<Self, FerryError> {
        let open = s.find('<');
        let close = s.rfind('>');
        match (open, close) {
            (Some(open), Some(close)) if open < close => {
                let name = s[..open].trim();
                let email = s[open + 1..close].trim();
                if name.is_empty() {
                    return Err(FerryError::validation(format!(
                        "invalid author '{s}': empty name"
                    )));
                }
                Ok(Self::new(name, email))
            }
            _ => Err(FerryError::validation(format!(
                "invalid author '{s}': expected 'Name <email>'"
            ))),
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
