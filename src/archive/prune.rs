//! Removal of source-tree files that do not belong in a release.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use log::debug;

use crate::runtime::Runtime;

/// Matched against the file name at any depth.
const NAME_PATTERNS: &[&str] = &[".git", ".github", ".gitignore", ".gitattributes", "*.o"];

/// Matched against the path relative to the source root.
const PATH_PATTERNS: &[&str] = &[
    "c_code",
    "csources_v*",
    "build.sh",
    "build_all.sh",
    "build_all.bat",
    "makefile",
    "bin/nim_csources*",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Files and directories excluded from a release, by name or by relative path.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    names: Vec<Pattern>,
    paths: Vec<Pattern>,
}

impl ExclusionSet {
    pub fn new(names: &[&str], paths: &[&str]) -> Result<Self> {
        let compile = |patterns: &[&str]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| Pattern::new(p).with_context(|| format!("Invalid exclusion pattern {:?}", p)))
                .collect()
        };
        Ok(Self {
            names: compile(names)?,
            paths: compile(paths)?,
        })
    }

    /// Version control metadata, generated C sources, object files, build
    /// scripts and the bootstrap compiler.
    pub fn release_defaults() -> Result<Self> {
        Self::new(NAME_PATTERNS, PATH_PATTERNS)
    }

    /// Whether `relative` (a path below the source root) is excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if self
            .names
            .iter()
            .any(|p| p.matches_with(&name, MATCH_OPTIONS))
        {
            return true;
        }

        let joined = slash_path(relative);
        self.paths
            .iter()
            .any(|p| p.matches_with(&joined, MATCH_OPTIONS))
    }
}

/// Delete every excluded entry below `root`; returns what was removed.
///
/// Symlinked directories are never descended into.
pub fn prune_source_tree<R: Runtime>(
    runtime: &R,
    root: &Path,
    exclusions: &ExclusionSet,
) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = runtime
            .read_dir(&dir)
            .with_context(|| format!("Failed to read directory {:?}", dir))?;
        entries.sort();

        for entry in entries {
            let relative = entry.strip_prefix(root).unwrap_or(&entry);
            let is_link = runtime.is_symlink(&entry);

            if exclusions.is_excluded(relative) {
                debug!("Pruning {:?}", relative);
                if is_link {
                    runtime.remove_symlink(&entry)?;
                } else if runtime.is_dir(&entry) {
                    runtime.remove_dir_all(&entry)?;
                } else {
                    runtime.remove_file(&entry)?;
                }
                removed.push(entry);
            } else if !is_link && runtime.is_dir(&entry) {
                pending.push(entry);
            }
        }
    }

    removed.sort();
    Ok(removed)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
