//! Building and packaging a release from an extracted source tree.
//!
//! [`build_release`] resolves a [`ReleaseContext`], then [`Packager::run`]
//! walks the fixed sequence: bootstrap, compiler, tools, documentation,
//! metadata, archive, publication. Every external step sits behind a trait
//! so the sequence can be exercised without a toolchain.

mod artifact;
mod context;
mod metadata;
mod steps;

use std::io::{self, Write};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::archive::{Archiver, TarXzArchiver, WindowsZipArchiver};
use crate::error::Error;
use crate::pipeline::{PipelineBackend, folded, select_backend};
use crate::platform::Os;
use crate::process::CommandRunner;
use crate::runtime::Runtime;

pub use artifact::{ArtifactSpec, tar_name, tarball_name, windows_cpu_suffix, zip_name};
pub use context::{ReleaseContext, ReleaseOptions, default_cc};
pub use metadata::{BuildMetadata, METADATA_PROGRAM};
pub use steps::{Builder, DocGenerator, KochBuilder};

/// File in the output directory naming the produced artifact.
pub const NIM_TXT: &str = "nim.txt";

pub struct Packager<'a, R: Runtime> {
    runtime: &'a R,
    builder: &'a dyn Builder,
    docs: &'a dyn DocGenerator,
    zip: &'a dyn Archiver,
    tarball: &'a dyn Archiver,
}

impl<'a, R: Runtime> Packager<'a, R> {
    pub fn new(
        runtime: &'a R,
        builder: &'a dyn Builder,
        docs: &'a dyn DocGenerator,
        zip: &'a dyn Archiver,
        tarball: &'a dyn Archiver,
    ) -> Self {
        Self {
            runtime,
            builder,
            docs,
            zip,
            tarball,
        }
    }

    /// Build, archive and publish. The first failing step ends the run and
    /// leaves whatever it produced in place.
    pub fn run<W: Write>(
        &self,
        ctx: &ReleaseContext,
        pipeline: &mut dyn PipelineBackend,
        out: &mut W,
    ) -> Result<ArtifactSpec> {
        self.runtime
            .create_dir_all(&ctx.output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", ctx.output_dir))?;

        folded(pipeline, "Build csources compiler", || self.builder.bootstrap(ctx))?;
        folded(pipeline, "Build compiler", || self.builder.build_compiler(ctx))?;
        folded(pipeline, "Build tools", || self.builder.build_tools(ctx))?;
        match ctx.host.os {
            Os::Windows => debug!("Documentation is bundled by winrelease, skipping"),
            Os::Darwin | Os::Linux | Os::Other(_) => {
                folded(pipeline, "Build documentation", || self.docs.generate(ctx))?
            }
        }

        let meta = self.builder.metadata(ctx)?;
        let archiver = match ctx.host.os {
            Os::Windows => self.zip,
            Os::Darwin | Os::Linux | Os::Other(_) => self.tarball,
        };
        let artifact = folded(pipeline, "Create release archive", || {
            archiver.archive(ctx, &meta)
        })?;

        if !self.runtime.is_file(&artifact.file_path) {
            return Err(Error::MissingArtifact(artifact.file_path).into());
        }
        publish(self.runtime, &artifact, out)?;
        Ok(artifact)
    }
}

/// Print the artifact path and record it in `<output>/nim.txt` (no trailing newline).
pub fn publish<R: Runtime, W: Write>(
    runtime: &R,
    artifact: &ArtifactSpec,
    out: &mut W,
) -> Result<()> {
    let path = artifact.file_path.to_string_lossy();
    info!("Release archive: {}", path);
    info!("{}", artifact.provenance());
    writeln!(out, "{}", path).context("Failed to print artifact path")?;

    let record = artifact.output_dir.join(NIM_TXT);
    runtime
        .write(&record, path.as_bytes())
        .with_context(|| format!("Failed to write {:?}", record))
}

/// Entry point of `build-release`: the real toolchain, stdout for results.
pub fn build_release<R: Runtime, C: CommandRunner>(
    runtime: &R,
    runner: &C,
    options: &ReleaseOptions,
) -> Result<ArtifactSpec> {
    let ctx = ReleaseContext::resolve(runtime, runner, options)?;

    let koch = KochBuilder::new(runner);
    let zip = WindowsZipArchiver::new(runtime, runner);
    let tarball = TarXzArchiver::new(runtime, runner);
    let packager = Packager::new(runtime, &koch, &koch, &zip, &tarball);

    let mut pipeline = select_backend(runtime, io::stdout())?;
    packager.run(&ctx, pipeline.as_mut(), &mut io::stdout())
}

#[cfg(all(test, unix))]
mod tests {
    use super::steps::{MockBuilder, MockDocGenerator};
    use super::*;
    use crate::archive::MockArchiver;
    use crate::error::exit_code_of;
    use crate::pipeline::AzurePipelines;
    use crate::process::MockCommandRunner;
    use crate::runtime::RealRuntime;
    use crate::test_utils::test_context;
    use mockall::Sequence;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn builder(meta: BuildMetadata) -> MockBuilder {
        let mut builder = MockBuilder::new();
        let mut seq = Sequence::new();
        builder
            .expect_bootstrap()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        builder
            .expect_build_compiler()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        builder
            .expect_build_tools()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        builder
            .expect_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(meta.clone()));
        builder
    }

    fn unused_archiver() -> MockArchiver {
        let mut archiver = MockArchiver::new();
        archiver.expect_archive().never();
        archiver
    }

    fn write_file(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    /// Runner standing in for `winrelease`: drops the zip where the real tool would.
    fn winrelease(zip: &'static str) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(2).returning(move |cmd| {
            if cmd.get_program().ends_with("bin/winrelease.exe") {
                let cwd = cmd.get_cwd().unwrap();
                write_file(&cwd.join("web/upload/download").join(zip));
            }
            Ok(())
        });
        runner
    }

    #[test]
    fn test_linux_release_end_to_end() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        for file in ["koch.nim", "bin/nim", "c_code/x.c", ".git/HEAD"] {
            write_file(&source.join(file));
        }

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| cmd.get_program() == Path::new("xz"))
            .times(1)
            .returning(|cmd| {
                let tar = PathBuf::from(cmd.get_args().last().unwrap());
                fs::rename(&tar, tar.with_extension("tar.xz")).unwrap();
                Ok(())
            });

        let builder = builder(BuildMetadata::new("2.0.0", "linux", "amd64"));
        let mut docs = MockDocGenerator::new();
        docs.expect_generate().times(1).returning(|_| Ok(()));
        let tarball = TarXzArchiver::new(&RealRuntime, &runner);
        let zip = unused_archiver();

        let ctx = test_context(Os::Linux, source, output.clone());
        let mut ci = Vec::new();
        let mut out = Vec::new();
        let artifact = {
            let mut pipeline = AzurePipelines::new(&mut ci);
            Packager::new(&RealRuntime, &builder, &docs, &zip, &tarball)
                .run(&ctx, &mut pipeline, &mut out)
                .unwrap()
        };

        let expected = output.join("nim-2.0.0.tar.xz");
        assert_eq!(artifact.file_path, expected);
        assert!(expected.is_file());
        assert_eq!(
            fs::read_to_string(output.join(NIM_TXT)).unwrap(),
            expected.to_string_lossy()
        );
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n", expected.display())
        );
        assert_eq!(
            String::from_utf8(ci).unwrap(),
            "##[group]Build csources compiler\n##[endgroup]\n\
             ##[group]Build compiler\n##[endgroup]\n\
             ##[group]Build tools\n##[endgroup]\n\
             ##[group]Build documentation\n##[endgroup]\n\
             ##[group]Create release archive\n##[endgroup]\n"
        );
    }

    #[test]
    fn test_windows_i386_release() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        fs::create_dir_all(&source).unwrap();

        let runner = winrelease("nim-2.0.0_x32.zip");
        let builder = builder(BuildMetadata::new("2.0.0", "windows", "i386"));
        let mut docs = MockDocGenerator::new();
        docs.expect_generate().never();
        let zip = WindowsZipArchiver::new(&RealRuntime, &runner);
        let tarball = unused_archiver();

        let ctx = test_context(Os::Windows, source, output.clone());
        let mut ci = Vec::new();
        let mut out = Vec::new();
        let artifact = {
            let mut pipeline = AzurePipelines::new(&mut ci);
            Packager::new(&RealRuntime, &builder, &docs, &zip, &tarball)
                .run(&ctx, &mut pipeline, &mut out)
                .unwrap()
        };

        assert_eq!(artifact.file_name, "nim-2.0.0_x32.zip");
        assert!(output.join("nim-2.0.0_x32.zip").is_file());
        assert_eq!(
            fs::read_to_string(output.join(NIM_TXT)).unwrap(),
            output.join("nim-2.0.0_x32.zip").to_string_lossy()
        );
        assert!(!String::from_utf8(ci).unwrap().contains("Build documentation"));
    }

    #[test_log::test]
    fn test_windows_unsupported_cpu_still_succeeds() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        fs::create_dir_all(&source).unwrap();

        let runner = winrelease("nim-2.0.0-windows_arm64.zip");
        let builder = builder(BuildMetadata::new("2.0.0", "windows", "arm64"));
        let mut docs = MockDocGenerator::new();
        docs.expect_generate().never();
        let zip = WindowsZipArchiver::new(&RealRuntime, &runner);
        let tarball = unused_archiver();

        let ctx = test_context(Os::Windows, source, output.clone());
        let mut ci = Vec::new();
        let mut out = Vec::new();
        let artifact = {
            let mut pipeline = AzurePipelines::new(&mut ci);
            Packager::new(&RealRuntime, &builder, &docs, &zip, &tarball)
                .run(&ctx, &mut pipeline, &mut out)
                .unwrap()
        };

        assert_eq!(artifact.file_name, "nim-2.0.0-windows_arm64.zip");
        assert!(output.join("nim-2.0.0-windows_arm64.zip").is_file());
    }

    #[test]
    fn test_step_failure_aborts_with_its_exit_code() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("output");

        let mut builder = MockBuilder::new();
        builder.expect_bootstrap().times(1).returning(|_| Ok(()));
        builder.expect_build_compiler().times(1).returning(|_| {
            Err(Error::CommandFailed {
                command: "koch boot -d:release".into(),
                code: Some(3),
            })
            .context("Failed to build compiler")
        });
        builder.expect_build_tools().never();
        builder.expect_metadata().never();
        let mut docs = MockDocGenerator::new();
        docs.expect_generate().never();
        let zip = unused_archiver();
        let tarball = unused_archiver();

        let ctx = test_context(Os::Linux, dir.path().join("Nim"), output.clone());
        let mut ci = Vec::new();
        let mut out = Vec::new();
        let err = {
            let mut pipeline = AzurePipelines::new(&mut ci);
            Packager::new(&RealRuntime, &builder, &docs, &zip, &tarball)
                .run(&ctx, &mut pipeline, &mut out)
                .unwrap_err()
        };

        assert_eq!(exit_code_of(&err), 3);
        assert!(out.is_empty());
        assert!(!output.join(NIM_TXT).exists());
        assert!(
            String::from_utf8(ci)
                .unwrap()
                .ends_with("##[group]Build compiler\n")
        );
    }

    #[test]
    fn test_missing_artifact_is_not_published() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("output");

        let builder = builder(BuildMetadata::new("2.0.0", "linux", "amd64"));
        let mut docs = MockDocGenerator::new();
        docs.expect_generate().returning(|_| Ok(()));
        let zip = unused_archiver();
        let mut tarball = MockArchiver::new();
        tarball
            .expect_archive()
            .times(1)
            .returning(|ctx, meta| Ok(ArtifactSpec::in_output(ctx, tarball_name(meta))));

        let ctx = test_context(Os::Linux, dir.path().join("Nim"), output.clone());
        let mut ci = Vec::new();
        let mut out = Vec::new();
        let err = {
            let mut pipeline = AzurePipelines::new(&mut ci);
            Packager::new(&RealRuntime, &builder, &docs, &zip, &tarball)
                .run(&ctx, &mut pipeline, &mut out)
                .unwrap_err()
        };

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingArtifact(_))
        ));
        assert!(!output.join(NIM_TXT).exists());
    }

    #[test]
    fn test_publish_writes_path_without_newline() {
        let dir = tempdir().unwrap();
        let artifact = ArtifactSpec {
            output_dir: dir.path().to_path_buf(),
            deps_dir: PathBuf::from("/deps"),
            source_dir: PathBuf::from("/src"),
            file_name: "nim-2.0.0.tar.xz".into(),
            file_path: dir.path().join("nim-2.0.0.tar.xz"),
        };

        let mut out = Vec::new();
        publish(&RealRuntime, &artifact, &mut out).unwrap();

        let recorded = fs::read_to_string(dir.path().join(NIM_TXT)).unwrap();
        assert_eq!(recorded, artifact.file_path.to_string_lossy());
        assert!(!recorded.ends_with('\n'));
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", recorded));
    }
}
