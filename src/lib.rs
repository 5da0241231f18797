//! ferry — a batch revision-migration engine between git repositories.
//!
//! ferry moves revisions from an *origin* repository into a *destination*
//! repository, applying deterministic content transforms and rewriting
//! commit metadata in flight. The engine is organized around four seams:
//! origin readers ([`origin`]), destination writers ([`destination`]), the
//! workflow executor ([`workflow`]), and the mirror engine ([`mirror`]) —
//! all sharing the bare-repo cache from the `ferry-git` plumbing crate.

pub mod api;
pub mod authoring;
pub mod config;
pub mod console;
pub mod destination;
pub mod error;
pub mod integrate;
pub mod mirror;
pub mod model;
pub mod origin;
pub mod retry;
pub mod transform;
pub mod workdir;
pub mod workflow;

pub use authoring::Authoring;
pub use console::{CaptureConsole, Console, StdConsole};
pub use error::{ErrorKind, FerryError};
pub use workflow::{Workflow, WorkflowMode};
