//! Console abstraction for user-visible messages and confirmations.
//!
//! Writers emit progress and warnings through a [`Console`] and may block on
//! a yes/no prompt before pushing. Tests use [`CaptureConsole`] with a
//! scripted answer.

use std::cell::RefCell;
use std::io::{BufRead, Write};

use crate::error::FerryError;

/// Message severities recorded by [`CaptureConsole`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// User-visible output plus the ask-for-confirmation prompt.
pub trait Console {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Ask a yes/no question; `false` means the user declined.
    ///
    /// # Errors
    /// [`FerryError::Io`] when the answer cannot be read.
    fn prompt_confirm(&self, question: &str) -> Result<bool, FerryError>;
}

/// Console writing to stderr and prompting on stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("WARNING: {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("ERROR: {message}");
    }

    fn prompt_confirm(&self, question: &str) -> Result<bool, FerryError> {
        eprint!("{question} [y/N] ");
        std::io::stderr().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Recording console with a scripted confirmation answer.
#[derive(Debug, Default)]
pub struct CaptureConsole {
    messages: RefCell<Vec<(Severity, String)>>,
    /// The answer returned by every prompt.
    pub answer: bool,
}

impl CaptureConsole {
    #[must_use]
    pub fn answering(answer: bool) -> Self {
        Self {
            messages: RefCell::new(Vec::new()),
            answer,
        }
    }

    /// All recorded messages in order.
    #[must_use]
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages.borrow().clone()
    }

    /// Whether any message of `severity` contains `needle`.
    #[must_use]
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|(s, m)| *s == severity && m.contains(needle))
    }
}

impl Console for CaptureConsole {
    fn info(&self, message: &str) {
        self.messages
            .borrow_mut()
            .push((Severity::Info, message.to_owned()));
    }

    fn warn(&self, message: &str) {
        self.messages
            .borrow_mut()
            .push((Severity::Warn, message.to_owned()));
    }

    fn error(&self, message: &str) {
        self.messages
            .borrow_mut()
            .push((Severity::Error, message.to_owned()));
    }

    fn prompt_confirm(&self, question: &str) -> Result<bool, FerryError> {
        self.messages
            .borrow_mut()
            .push((Severity::Info, question.to_owned()));
        Ok(self.answer)
    }
}
