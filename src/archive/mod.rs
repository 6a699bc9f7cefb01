mod prune;
mod tar_xz;
mod zip;

use anyhow::Result;

use crate::release::{ArtifactSpec, BuildMetadata, ReleaseContext};

pub use prune::{ExclusionSet, prune_source_tree};
pub use tar_xz::TarXzArchiver;
pub use zip::WindowsZipArchiver;

/// Turns a built source tree into a release archive in the output directory.
#[cfg_attr(test, mockall::automock)]
pub trait Archiver {
    fn archive(&self, ctx: &ReleaseContext, meta: &BuildMetadata) -> Result<ArtifactSpec>;
}
