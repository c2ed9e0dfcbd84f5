//! Filesystem helpers shared by the steps.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::step::StepError;

/// All files below `root` in sorted depth-first order.
///
/// A missing root yields no files.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    walk_files_except(root, None)
}

/// Like [`walk_files`], skipping everything below `excluded`.
pub fn walk_files_except(root: &Path, excluded: Option<&Path>) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| excluded.map_or(true, |ex| e.path() != ex))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Files directly inside `dir` with the given extension, sorted by name.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .map(|e| e.into_path())
        .collect()
}

pub fn read(path: &Path) -> Result<Vec<u8>, StepError> {
    fs::read(path).map_err(|source| StepError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `contents` to `path`, creating parent directories.
pub fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), StepError> {
    let map_err = |source| StepError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(map_err)?;
    }
    fs::write(path, contents).map_err(map_err)
}

/// Human-readable byte size, as printed in build logs.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
