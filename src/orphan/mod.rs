//! Orphan detection over the output tree.
//!
//! An orphan is a previously generated file that no longer corresponds to
//! anything in the current document. Detection compares file identity only
//! (path within the managed subdirectories); free-region content is never
//! inspected, so operator edits can never cause a false orphan report.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::RenderError;

/// Subdirectories of the output tree that topogen owns.
const MANAGED_SUBDIRS: &[&str] = &["inventory", "group_vars", "host_vars"];

/// Returns every managed `.yml` file present under `out_dir` but absent
/// from `desired`, in sorted order.
pub fn detect(out_dir: &Path, desired: &BTreeSet<PathBuf>) -> Result<Vec<PathBuf>, RenderError> {
    let mut orphans = Vec::new();

    for subdir in MANAGED_SUBDIRS {
        let dir = out_dir.join(subdir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| RenderError::Io {
                file: dir.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yml") {
                continue;
            }
            let rel = PathBuf::from(subdir).join(entry.file_name());
            if !desired.contains(&rel) {
                orphans.push(rel);
            }
        }
    }

    orphans.sort();
    Ok(orphans)
}

/// Deletes exactly the given orphans. Only called when cleanup was
/// explicitly authorized.
pub fn remove(out_dir: &Path, orphans: &[PathBuf]) -> Result<(), RenderError> {
    for rel in orphans {
        let path = out_dir.join(rel);
        fs::remove_file(&path).map_err(|e| RenderError::Io {
            file: path.clone(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "stale\n").unwrap();
    }

    fn desired(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn undeclared_files_are_orphans() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "host_vars/kept.yml");
        touch(temp.path(), "host_vars/stale.yml");

        let orphans = detect(temp.path(), &desired(&["host_vars/kept.yml"])).unwrap();
        assert_eq!(orphans, vec![PathBuf::from("host_vars/stale.yml")]);
    }

    #[test]
    fn files_outside_managed_subdirs_are_ignored() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "notes/todo.yml");
        touch(temp.path(), "README.md");

        let orphans = detect(temp.path(), &desired(&[])).unwrap();
        assert!(orphans.is_empty());
    }

    #[test]
    fn non_yml_files_in_managed_subdirs_are_ignored() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "group_vars/all.yml.bak");

        let orphans = detect(temp.path(), &desired(&[])).unwrap();
        assert!(orphans.is_empty());
    }

    #[test]
    fn remove_deletes_exactly_the_orphans() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "host_vars/kept.yml");
        touch(temp.path(), "host_vars/stale.yml");

        let orphans = detect(temp.path(), &desired(&["host_vars/kept.yml"])).unwrap();
        remove(temp.path(), &orphans).unwrap();

        assert!(temp.path().join("host_vars/kept.yml").exists());
        assert!(!temp.path().join("host_vars/stale.yml").exists());
    }

    #[test]
    fn empty_output_tree_has_no_orphans() {
        let temp = TempDir::new().unwrap();
        let orphans = detect(temp.path(), &desired(&[])).unwrap();
        assert!(orphans.is_empty());
    }
}
