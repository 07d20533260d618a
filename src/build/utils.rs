//! Filesystem timestamp helpers shared by rule actions and module builds.

use crate::error::{BuildError, Result};
use crate::rules::glob::is_ignored;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

pub fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether `input` was modified after `output`, or `output` is missing.
pub fn is_newer(input: &Path, output: &Path) -> bool {
    match (mtime(input), mtime(output)) {
        (_, None) => true,
        (Some(i), Some(o)) => i > o,
        (None, Some(_)) => false,
    }
}

/// Files below `dir`, skipping hidden and editor entries.
pub fn files_below(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_ignored(&entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Latest modification time of any file below `dir`.
pub fn newest_below(dir: &Path) -> Option<SystemTime> {
    files_below(dir).iter().filter_map(|p| mtime(p)).max()
}

/// Makes `target` strictly newer than `inputs`, whether or not the action
/// wrote it. Directories are left alone.
pub fn touch_after(target: &Path, inputs: impl IntoIterator<Item = SystemTime>) -> Result<()> {
    if !target.is_file() {
        return Ok(());
    }
    let Some(newest) = inputs.into_iter().max() else {
        return Ok(());
    };
    let current = mtime(target);
    if current.is_some_and(|c| c > newest) {
        return Ok(());
    }
    let stamp = std::cmp::max(SystemTime::now(), newest + Duration::from_millis(1));
    let file = fs::File::options()
        .write(true)
        .open(target)
        .map_err(|e| BuildError::io_at(target, e))?;
    file.set_modified(stamp)
        .map_err(|e| BuildError::io_at(target, e))?;
    Ok(())
}

/// Copies `from` to `to` when `from` is newer. Returns whether it copied.
pub fn copy_if_newer(from: &Path, to: &Path) -> Result<bool> {
    if !is_newer(from, to) {
        return Ok(false);
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io_at(parent, e))?;
    }
    fs::copy(from, to).map_err(|e| BuildError::io_at(from, e))?;
    Ok(true)
}

/// Deletes a file or directory tree. With `dry_run` only reports it.
pub fn remove_path(path: &Path, dry_run: bool) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    if dry_run {
        return Ok(true);
    }
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| BuildError::io_at(path, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_after_moves_target_past_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        fs::write(&target, "x").unwrap();
        let future = SystemTime::now() + Duration::from_secs(3600);
        touch_after(&target, [future]).unwrap();
        assert!(mtime(&target).unwrap() > future);
    }

    #[test]
    fn test_touch_after_keeps_newer_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        fs::write(&target, "x").unwrap();
        let before = mtime(&target).unwrap();
        touch_after(&target, [before - Duration::from_secs(60)]).unwrap();
        assert_eq!(mtime(&target).unwrap(), before);
    }

    #[test]
    fn test_files_below_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("a.txt~"), "a").unwrap();
        let files = files_below(dir.path());
        assert_eq!(files, [dir.path().join("a.txt")]);
    }

    #[test]
    fn test_copy_if_newer() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("sub/b");
        fs::write(&from, "a").unwrap();
        assert!(copy_if_newer(&from, &to).unwrap());
        assert!(!copy_if_newer(&from, &to).unwrap());
    }

    #[test]
    fn test_remove_path_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, "a").unwrap();
        assert!(remove_path(&file, true).unwrap());
        assert!(file.exists());
        assert!(remove_path(&file, false).unwrap());
        assert!(!file.exists());
        assert!(!remove_path(&file, false).unwrap());
    }
}
