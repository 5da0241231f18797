//! Transient work-tree file operations.
//!
//! A workdir is owned by exactly one workflow run between `beforeRun` and
//! `afterRun`; its contents are transient. These helpers copy trees between
//! origin checkouts, workdirs, and destination work-trees, applying a path
//! filter and never descending into `.git`.

use std::path::{Path, PathBuf};

use crate::error::FerryError;
use crate::model::Glob;

/// Copy every file under `src` matching `filter` into `dst`, preserving
/// relative paths. `.git` directories are never entered. Returns the number
/// of files copied.
///
/// # Errors
/// [`FerryError::Io`] on filesystem failures.
pub fn copy_tree(src: &Path, dst: &Path, filter: &Glob) -> Result<usize, FerryError> {
    let mut copied = 0;
    for rel in list_files(src)? {
        if !filter.matches(&rel) {
            continue;
        }
        let target = dst.join(&rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src.join(&rel), &target)?;
        copied += 1;
    }
    Ok(copied)
}

/// Delete every file under `root` matching `filter`, then prune directories
/// left empty. `.git` is never touched.
///
/// # Errors
/// [`FerryError::Io`] on filesystem failures.
pub fn remove_matching(root: &Path, filter: &Glob) -> Result<(), FerryError> {
    for rel in list_files(root)? {
        if filter.matches(&rel) {
            std::fs::remove_file(root.join(&rel))?;
        }
    }
    prune_empty_dirs(root, root)?;
    Ok(())
}

/// All regular files under `root` as sorted relative paths, skipping `.git`
/// directories.
///
/// # Errors
/// [`FerryError::Io`] on filesystem failures.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, FerryError> {
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), FerryError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            walk(root, &path, out)?;
        } else if file_type.is_file() || file_type.is_symlink() {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

fn prune_empty_dirs(root: &Path, dir: &Path) -> Result<bool, FerryError> {
    let mut empty = true;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if entry.file_name() == ".git" {
                empty = false;
                continue;
            }
            if prune_empty_dirs(root, &path)? {
                std::fs::remove_dir(&path)?;
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    // The root itself is never removed.
    Ok(empty && dir != root)
}
