//! Core data model: revisions, changes, labels, authors, and path filters.

pub mod author;
pub mod change;
pub mod glob;
pub mod labels;
pub mod revision;

pub use author::Author;
pub use change::Change;
pub use glob::Glob;
pub use labels::{Label, LabelSet};
pub use revision::Revision;
