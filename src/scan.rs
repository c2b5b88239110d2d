use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, Result};

/// True when the file extension (case-insensitive) is one of `extensions`.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

/// Image files under `root`, depth-first with each directory sorted by name.
///
/// `recursive = false` only looks at the direct children of `root`.
pub fn list_images(root: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::MissingDirectory(root.to_path_buf()));
    }
    let walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    let walker = if recursive {
        walker
    } else {
        walker.max_depth(1)
    };
    Ok(walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extensions))
        .map(|e| e.into_path())
        .collect())
}

/// Direct subdirectories of `root`, sorted by name.
pub fn list_subdirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::MissingDirectory(root.to_path_buf()));
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Final path component as a display string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
