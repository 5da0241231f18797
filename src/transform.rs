//! The transform pipeline seam.
//!
//! Transforms are pure functions over a workdir tree; the pipeline itself is
//! external to the engine. The engine ships only the trait, the identity
//! transform, and a sequence combinator for composing externally-provided
//! steps.

use std::path::Path;

use crate::console::Console;
use crate::error::FerryError;

/// One deterministic content transform applied to a workdir.
pub trait Transformation {
    /// Short human-readable name for progress output.
    fn describe(&self) -> &str;

    /// Rewrite the tree under `workdir` in place.
    ///
    /// # Errors
    /// Any [`FerryError`]; validation-kind errors abort the workflow.
    fn transform(&self, workdir: &Path, console: &dyn Console) -> Result<(), FerryError>;
}

/// The transform that changes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Transformation for Identity {
    fn describe(&self) -> &str {
        "identity"
    }

    fn transform(&self, _workdir: &Path, _console: &dyn Console) -> Result<(), FerryError> {
        Ok(())
    }
}

/// Transforms applied in declared order.
#[derive(Default)]
pub struct Sequence {
    steps: Vec<Box<dyn Transformation>>,
}

impl Sequence {
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Transformation>>) -> Self {
        Self { steps }
    }
}

impl Transformation for Sequence {
    fn describe(&self) -> &str {
        "sequence"
    }

    fn transform(&self, workdir: &Path, console: &dyn Console) -> Result<(), FerryError> {
        for step in &self.steps {
            console.info(&format!("applying transform: {}", step.describe()));
            step.transform(workdir, console)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::CaptureConsole;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct Touch(&'static str);

    impl Transformation for Touch {
        fn describe(&self) -> &str {
            self.0
        }
        fn transform(&self, workdir: &Path, _console: &dyn Console) -> Result<(), FerryError> {
            std::fs::write(workdir.join(self.0), "x")?;
            Ok(())
        }
    }

    struct Failing(Cell<bool>);

    impl Transformation for Failing {
        fn describe(&self) -> &str {
            "failing"
        }
        fn transform(&self, _workdir: &Path, _console: &dyn Console) -> Result<(), FerryError> {
            self.0.set(true);
            Err(FerryError::validation("boom"))
        }
    }

    #[test]
    fn identity_leaves_tree_alone() {
        let dir = TempDir::new().unwrap();
        let console = CaptureConsole::answering(true);
        Identity.transform(dir.path(), &console).unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn sequence_applies_in_order_and_stops_on_error() {
        let dir = TempDir::new().unwrap();
        let console = CaptureConsole::answering(true);
        let seq = Sequence::new(vec![
            Box::new(Touch("first")),
            Box::new(Failing(Cell::new(false))),
            Box::new(Touch("never")),
        ]);
        let err = seq.transform(dir.path(), &console).unwrap_err();
        assert!(format!("{err}").contains("boom"));
        assert!(dir.path().join("first").exists());
        assert!(!dir.path().join("never").exists());
    }
}
