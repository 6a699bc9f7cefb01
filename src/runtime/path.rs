//! Path utility functions for normalization and symlink targets.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // At the root (or an empty relative path) keep the `..`
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => {
                result.push(component);
            }
        }
    }
    result
}

/// Resolve `path` against `base` when it is relative, then normalize it.
pub fn absolute_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Calculate the target a symlink at `link` should store to reach `target`.
///
/// For example, a link at `/work/output/nim-2.0.0` pointing to `/work/Nim`
/// gets `../Nim`. Falls back to the absolute target when no relative path
/// exists (e.g., different drive letters on Windows).
pub fn relative_link_target(link: &Path, target: &Path) -> PathBuf {
    link.parent()
        .and_then(|from_dir| pathdiff::diff_paths(target, from_dir))
        .filter(|relative| !relative.is_absolute())
        .unwrap_or_else(|| target.to_path_buf())
}
