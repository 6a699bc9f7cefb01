//! External build steps.
//!
//! The packager only sees [`Builder`] and [`DocGenerator`]; [`KochBuilder`]
//! drives the real toolchain (`make` on the generated C sources, then
//! `koch`).

use anyhow::{Context, Result};
use log::info;

use super::context::ReleaseContext;
use super::metadata::{BuildMetadata, METADATA_PROGRAM};
use crate::process::CommandRunner;

/// Builds the compiler and its tools.
#[cfg_attr(test, mockall::automock)]
pub trait Builder {
    /// Compile the bootstrap compiler from the generated C sources.
    fn bootstrap(&self, ctx: &ReleaseContext) -> Result<()>;

    /// Let the bootstrap compiler rebuild itself in release mode.
    fn build_compiler(&self, ctx: &ReleaseContext) -> Result<()>;

    fn build_tools(&self, ctx: &ReleaseContext) -> Result<()>;

    /// Ask the built compiler for its version, OS and CPU.
    fn metadata(&self, ctx: &ReleaseContext) -> Result<BuildMetadata>;
}

/// Generates the bundled documentation.
#[cfg_attr(test, mockall::automock)]
pub trait DocGenerator {
    fn generate(&self, ctx: &ReleaseContext) -> Result<()>;
}

pub struct KochBuilder<'a, C: CommandRunner> {
    runner: &'a C,
}

impl<'a, C: CommandRunner> KochBuilder<'a, C> {
    pub fn new(runner: &'a C) -> Self {
        Self { runner }
    }
}

impl<C: CommandRunner> Builder for KochBuilder<'_, C> {
    #[tracing::instrument(skip(self, ctx))]
    fn bootstrap(&self, ctx: &ReleaseContext) -> Result<()> {
        info!("Building csources compiler with {} jobs", ctx.jobs);
        let cmd = ctx
            .command("make")
            .arg(format!("-j{}", ctx.jobs))
            .arg(format!("CC={}", ctx.cc));
        self.runner
            .run(&cmd)
            .context("Failed to build csources compiler")
    }

    #[tracing::instrument(skip(self, ctx))]
    fn build_compiler(&self, ctx: &ReleaseContext) -> Result<()> {
        let nim = ctx.source_exe("bin/nim");
        self.runner
            .run(&ctx.command(&nim).args(["c", "koch"]))
            .context("Failed to compile koch")?;

        let koch = ctx.source_exe("koch");
        self.runner
            .run(&ctx.command(&koch).args(["boot", "-d:release"]))
            .context("Failed to build compiler")
    }

    #[tracing::instrument(skip(self, ctx))]
    fn build_tools(&self, ctx: &ReleaseContext) -> Result<()> {
        let koch = ctx.source_exe("koch");
        self.runner
            .run(&ctx.command(&koch).args(["tools", "-d:release"]))
            .context("Failed to build tools")
    }

    #[tracing::instrument(skip(self, ctx))]
    fn metadata(&self, ctx: &ReleaseContext) -> Result<BuildMetadata> {
        let nim = ctx.source_exe("bin/nim");
        let cmd = ctx
            .command(&nim)
            .arg("--hints:off")
            .arg(format!("--eval:{}", METADATA_PROGRAM));
        let output = self
            .runner
            .output(&cmd)
            .context("Failed to query compiler metadata")?;
        let meta = BuildMetadata::parse(&output, &cmd.display_command())?;
        info!(
            "Built Nim {} for {}/{}",
            meta.version, meta.host_os, meta.host_cpu
        );
        Ok(meta)
    }
}

impl<C: CommandRunner> DocGenerator for KochBuilder<'_, C> {
    #[tracing::instrument(skip(self, ctx))]
    fn generate(&self, ctx: &ReleaseContext) -> Result<()> {
        let koch = ctx.source_exe("koch");
        self.runner
            .run(&ctx.command(&koch).args(["docs", "-d:release"]))
            .context("Failed to build documentation")
    }
}
