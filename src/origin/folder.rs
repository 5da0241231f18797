//! Folder origin: a local directory treated as a one-change origin.
//!
//! Resolving produces a synthetic revision whose id is a digest of the tree
//! listing, so re-resolving an unchanged folder is stable within a run.
//! Enumeration always yields exactly one pseudo-change.

use std::path::{Path, PathBuf};

use chrono::Utc;
use ferry_git::GitOid;
use sha2::{Digest, Sha256};

use crate::error::FerryError;
use crate::model::{Author, Change, Glob, Revision};
use crate::origin::{ChangeVisitor, ChangesResponse, Origin, Reader};
use crate::workdir;

/// Label recording folder-origin imports.
pub const FOLDER_ORIGIN_LABEL: &str = "FolderOrigin-RevId";

/// A local directory acting as migration origin.
#[derive(Clone, Debug)]
pub struct FolderOrigin {
    path: PathBuf,
    author: Author,
}

impl FolderOrigin {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, author: Author) -> Self {
        Self {
            path: path.into(),
            author,
        }
    }
}

impl Origin for FolderOrigin {
    fn label_name(&self) -> &str {
        FOLDER_ORIGIN_LABEL
    }

    fn reader(&self, origin_files: &Glob) -> Result<Box<dyn Reader>, FerryError> {
        if !self.path.is_dir() {
            return Err(FerryError::validation(format!(
                "folder origin '{}' is not a directory",
                self.path.display()
            )));
        }
        Ok(Box::new(FolderReader {
            path: self.path.clone(),
            glob: origin_files.clone(),
            author: self.author.clone(),
        }))
    }
}

/// Reader over a folder origin.
pub struct FolderReader {
    path: PathBuf,
    glob: Glob,
    author: Author,
}

impl FolderReader {
    /// Digest the filtered tree listing (paths and sizes) into a synthetic
    /// 40-hex revision id.
    fn tree_digest(&self) -> Result<GitOid, FerryError> {
        let mut hasher = Sha256::new();
        for rel in workdir::list_files(&self.path)? {
            if !self.glob.matches(&rel) {
                continue;
            }
            let len = std::fs::metadata(self.path.join(&rel))?.len();
            hasher.update(rel.display().to_string().as_bytes());
            hasher.update(len.to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(40);
        for byte in digest.iter().take(20) {
            hex.push_str(&format!("{byte:02x}"));
        }
        GitOid::new(&hex).map_err(|e| FerryError::Internal {
            message: format!("folder digest produced an invalid id: {e}"),
        })
    }

    fn synthetic_change(&self, rev: &Revision) -> Change {
        let timestamp = rev
            .timestamp()
            .copied()
            .unwrap_or_else(|| Utc::now().fixed_offset());
        Change::new(
            rev.clone(),
            Vec::new(),
            self.author.clone(),
            self.author.clone(),
            timestamp,
            format!("Import of {}\n", self.path.display()),
            None,
            false,
        )
    }
}

impl Reader for FolderReader {
    fn resolve(&self, reference: &str) -> Result<Revision, FerryError> {
        let mut rev = Revision::new(self.tree_digest()?)
            .with_url(self.path.display().to_string())
            .with_timestamp(Utc::now().fixed_offset())
            .with_author(self.author.clone());
        if !reference.is_empty() {
            rev = rev.with_context_ref(reference);
        }
        Ok(rev)
    }

    fn changes(
        &self,
        _from: Option<&Revision>,
        to: &Revision,
    ) -> Result<ChangesResponse, FerryError> {
        Ok(ChangesResponse::Changes(vec![self.synthetic_change(to)]))
    }

    fn change(&self, rev: &Revision) -> Result<Change, FerryError> {
        Ok(self.synthetic_change(rev))
    }

    fn visit_changes(
        &self,
        start: &Revision,
        visitor: &mut ChangeVisitor<'_>,
    ) -> Result<(), FerryError> {
        let change = self.synthetic_change(start);
        let _ = visitor(&change)?;
        Ok(())
    }

    fn find_baselines_without_label(
        &self,
        _start: &Revision,
        _label: &str,
        _limit: usize,
    ) -> Result<Vec<Revision>, FerryError> {
        // A folder has no history to scan.
        Ok(Vec::new())
    }

    fn checkout(&self, _rev: &Revision, dir: &Path) -> Result<(), FerryError> {
        workdir::copy_tree(&self.path, dir, &self.glob)?;
        Ok(())
    }
}
