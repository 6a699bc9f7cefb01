use anyhow::{Context, Result};
use log::{info, warn};

use super::Archiver;
use crate::error::Error;
use crate::process::CommandRunner;
use crate::release::{ArtifactSpec, BuildMetadata, ReleaseContext, windows_cpu_suffix, zip_name};
use crate::runtime::Runtime;

/// Where `winrelease` leaves its zip, relative to the source tree.
const UPLOAD_DIR: &str = "web/upload/download";

/// Windows releases: `winrelease` builds the zip, we pick it up.
pub struct WindowsZipArchiver<'a, R: Runtime, C: CommandRunner> {
    runtime: &'a R,
    runner: &'a C,
}

impl<'a, R: Runtime, C: CommandRunner> WindowsZipArchiver<'a, R, C> {
    pub fn new(runtime: &'a R, runner: &'a C) -> Self {
        Self { runtime, runner }
    }
}

/// Suffix of the Windows zip for `meta`.
///
/// CPUs `winrelease` has no name for keep the generic `-<os>_<cpu>` suffix.
pub fn release_suffix(meta: &BuildMetadata) -> String {
    match windows_cpu_suffix(&meta.host_cpu) {
        Some(suffix) => suffix.to_string(),
        None => {
            warn!(
                "CPU {} is not supported by winrelease, using default suffix {}",
                meta.host_cpu, meta.archive_suffix
            );
            meta.archive_suffix.clone()
        }
    }
}

impl<R: Runtime, C: CommandRunner> Archiver for WindowsZipArchiver<'_, R, C> {
    #[tracing::instrument(skip(self, ctx, meta))]
    fn archive(&self, ctx: &ReleaseContext, meta: &BuildMetadata) -> Result<ArtifactSpec> {
        let nim = ctx.source_exe("bin/nim");
        self.runner
            .run(
                &ctx.command(&nim)
                    .args(["c", "-d:release", "--outdir:bin", "tools/winrelease.nim"]),
            )
            .context("Failed to build winrelease")?;

        let winrelease = ctx.source_exe("bin/winrelease");
        self.runner
            .run(&ctx.command(&winrelease))
            .context("Failed to create Windows release")?;

        let file_name = zip_name(meta, &release_suffix(meta));
        let produced = ctx.source_dir.join(UPLOAD_DIR).join(&file_name);
        if !self.runtime.is_file(&produced) {
            return Err(Error::MissingArtifact(produced).into());
        }

        let artifact = ArtifactSpec::in_output(ctx, file_name);
        info!("Copying {:?} to {:?}", produced, artifact.file_path);
        self.runtime
            .copy(&produced, &artifact.file_path)
            .with_context(|| format!("Failed to copy {:?} to the output directory", produced))?;
        Ok(artifact)
    }
}
