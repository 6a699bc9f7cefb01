//! Naming and location of the produced release archive.

use std::path::PathBuf;

use super::context::ReleaseContext;
use super::metadata::BuildMetadata;

/// Where the release archive lives and what it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub output_dir: PathBuf,
    /// Directory whose `environment` was imported for the build.
    pub deps_dir: PathBuf,
    /// Source tree the archive was packed from.
    pub source_dir: PathBuf,
    pub file_name: String,
    pub file_path: PathBuf,
}

impl ArtifactSpec {
    /// An artifact named `file_name` in the run's output directory.
    pub fn in_output(ctx: &ReleaseContext, file_name: String) -> Self {
        Self {
            output_dir: ctx.output_dir.clone(),
            deps_dir: ctx.deps_dir.clone(),
            source_dir: ctx.source_dir.clone(),
            file_path: ctx.output_dir.join(&file_name),
            file_name,
        }
    }

    /// One line naming the inputs of the build, for the run log.
    pub fn provenance(&self) -> String {
        format!(
            "{} built from {} with dependencies from {}",
            self.file_name,
            self.source_dir.display(),
            self.deps_dir.display()
        )
    }
}

/// `nim-<version>.tar` (before compression).
pub fn tar_name(meta: &BuildMetadata) -> String {
    format!("{}.tar", meta.release_name())
}

/// `nim-<version>.tar.xz`
pub fn tarball_name(meta: &BuildMetadata) -> String {
    format!("{}.xz", tar_name(meta))
}

/// Suffix the Windows release tool gives its zip for a CPU, if it knows it.
pub fn windows_cpu_suffix(cpu: &str) -> Option<&'static str> {
    match cpu {
        "amd64" => Some("_x64"),
        "i386" => Some("_x32"),
        _ => None,
    }
}

/// `nim-<version><suffix>.zip`
pub fn zip_name(meta: &BuildMetadata, suffix: &str) -> String {
    format!("{}{}.zip", meta.release_name(), suffix)
}
