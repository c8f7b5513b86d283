//! File enumeration inside a dataset cache.

use crate::archive::STAGING_PREFIX;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

fn is_staging(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with(STAGING_PREFIX))
        .unwrap_or(false)
}

/// List the files under `dir`.
///
/// With `recursive`, every directory discovered below `dir` is expanded as
/// well; otherwise only direct children are returned. Directories themselves
/// are never returned, a missing `dir` yields an empty list, and results are
/// sorted by path.
pub fn list_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| !is_staging(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .collect();
    files.sort();
    files
}
