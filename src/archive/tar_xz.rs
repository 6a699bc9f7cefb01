use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, info};

use super::Archiver;
use super::prune::{ExclusionSet, prune_source_tree};
use crate::error::Error;
use crate::process::CommandRunner;
use crate::release::{ArtifactSpec, BuildMetadata, ReleaseContext, tar_name, tarball_name};
use crate::runtime::{Runtime, relative_link_target};

/// Scratch directory the build leaves in the source tree.
const TEMP_BUILD_DIR: &str = "build";

/// Non-Windows releases: a pruned source tree (with binaries) as `.tar.xz`.
pub struct TarXzArchiver<'a, R: Runtime, C: CommandRunner> {
    runtime: &'a R,
    runner: &'a C,
}

/// Directory the archive is made from, and the staging link to drop afterwards.
struct ReleaseRoot {
    path: PathBuf,
    link: Option<PathBuf>,
}

impl<'a, R: Runtime, C: CommandRunner> TarXzArchiver<'a, R, C> {
    pub fn new(runtime: &'a R, runner: &'a C) -> Self {
        Self { runtime, runner }
    }

    /// The source tree as `nim-<version>`: itself if already so named,
    /// otherwise through a symlink in the output directory.
    fn stage_root(&self, ctx: &ReleaseContext, release_name: &str) -> Result<ReleaseRoot> {
        if ctx.source_dir.file_name().is_some_and(|n| n == release_name) {
            return Ok(ReleaseRoot {
                path: ctx.source_dir.clone(),
                link: None,
            });
        }

        let link = ctx.output_dir.join(release_name);
        if self.runtime.is_symlink(&link) {
            debug!("Replacing stale link {:?}", link);
            self.runtime.remove_symlink(&link)?;
        } else if self.runtime.exists(&link) {
            bail!("{:?} already exists and is not a symlink", link);
        }

        let target = relative_link_target(&link, &ctx.source_dir);
        debug!("Linking {:?} -> {:?}", link, target);
        self.runtime
            .symlink(&target, &link)
            .with_context(|| format!("Failed to link {:?} to {:?}", link, ctx.source_dir))?;

        Ok(ReleaseRoot {
            path: link.clone(),
            link: Some(link),
        })
    }

    fn write_tar(&self, root: &Path, release_name: &str, tar_path: &Path) -> Result<()> {
        info!("Creating {}", tar_path.display());
        let file = self.runtime.create_file(tar_path)?;
        let mut builder = tar::Builder::new(file);
        builder.follow_symlinks(true);
        builder
            .append_dir_all(release_name, root)
            .with_context(|| format!("Failed to add {:?} to {:?}", root, tar_path))?;
        builder
            .into_inner()
            .and_then(|mut file| file.flush())
            .with_context(|| format!("Failed to finish {:?}", tar_path))
    }
}

impl<R: Runtime, C: CommandRunner> Archiver for TarXzArchiver<'_, R, C> {
    #[tracing::instrument(skip(self, ctx, meta))]
    fn archive(&self, ctx: &ReleaseContext, meta: &BuildMetadata) -> Result<ArtifactSpec> {
        let build_dir = ctx.source_dir.join(TEMP_BUILD_DIR);
        if self.runtime.exists(&build_dir) {
            self.runtime.remove_dir_all(&build_dir)?;
        }

        let exclusions = ExclusionSet::release_defaults()?;
        let pruned = prune_source_tree(self.runtime, &ctx.source_dir, &exclusions)?;
        info!("Pruned {} entries from the source tree", pruned.len());

        let release_name = meta.release_name();
        let root = self.stage_root(ctx, &release_name)?;
        let tar_path = ctx.output_dir.join(tar_name(meta));
        self.write_tar(&root.path, &release_name, &tar_path)?;
        if let Some(link) = root.link {
            self.runtime.remove_symlink(&link)?;
        }

        self.runner
            .run(
                &ctx.command("xz")
                    .cwd(&ctx.output_dir)
                    .args(["-9e", "--force"])
                    .arg(&tar_path),
            )
            .context("Failed to compress release tarball")?;

        let artifact = ArtifactSpec::in_output(ctx, tarball_name(meta));
        if !self.runtime.is_file(&artifact.file_path) {
            return Err(Error::MissingArtifact(artifact.file_path).into());
        }
        Ok(artifact)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::exit_code_of;
    use crate::platform::Os;
    use crate::process::MockCommandRunner;
    use crate::runtime::RealRuntime;
    use crate::test_utils::test_context;
    use std::fs;
    use tempfile::tempdir;

    fn context(source_dir: PathBuf, output_dir: PathBuf) -> ReleaseContext {
        test_context(Os::Linux, source_dir, output_dir)
    }

    fn source_tree(root: &Path) {
        for file in [
            "koch.nim",
            "bin/nim",
            "lib/system.nim",
            ".git/HEAD",
            "c_code/1_1/stdlib_system.nim.c",
            "build/nimcache/x.o",
            "build_all.sh",
        ] {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file).unwrap();
        }
    }

    /// Stands in for `xz`: renames the tar so the archive can still be inspected.
    fn fake_xz() -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| cmd.get_program() == Path::new("xz"))
            .times(1)
            .returning(|cmd| {
                assert_eq!(&cmd.get_args()[..2], ["-9e", "--force"]);
                let tar = PathBuf::from(cmd.get_args().last().unwrap());
                fs::rename(&tar, tar.with_extension("tar.xz")).unwrap();
                Ok(())
            });
        runner
    }

    fn entries(archive: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(fs::File::open(archive).unwrap());
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_archive_linux_tarball() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        source_tree(&source);
        fs::create_dir_all(&output).unwrap();

        let runner = fake_xz();
        let ctx = context(source.clone(), output.clone());
        let artifact = TarXzArchiver::new(&RealRuntime, &runner)
            .archive(&ctx, &BuildMetadata::new("2.0.0", "linux", "amd64"))
            .unwrap();

        assert_eq!(artifact.file_name, "nim-2.0.0.tar.xz");
        assert_eq!(artifact.file_path, output.join("nim-2.0.0.tar.xz"));
        assert!(artifact.file_path.is_file());
        assert!(!output.join("nim-2.0.0.tar").exists());

        // The staging link is gone and the caller's tree stays where it was.
        assert!(fs::symlink_metadata(output.join("nim-2.0.0")).is_err());
        assert!(source.join("koch.nim").exists());
        assert!(!source.join(".git").exists());
        assert!(!source.join("build").exists());

        let names = entries(&artifact.file_path);
        assert!(names.iter().all(|n| n.starts_with("nim-2.0.0")));
        assert!(names.contains(&"nim-2.0.0/koch.nim".to_string()));
        assert!(names.contains(&"nim-2.0.0/bin/nim".to_string()));
        assert!(names.contains(&"nim-2.0.0/lib/system.nim".to_string()));
        assert!(!names.iter().any(|n| n.contains("c_code") || n.contains(".git")));
        assert!(!names.iter().any(|n| n.contains("build_all.sh")));
    }

    #[test]
    fn test_archive_source_already_named_for_release() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("nim-2.0.0");
        let output = dir.path().join("output");
        source_tree(&source);
        fs::create_dir_all(&output).unwrap();

        let runner = fake_xz();
        let ctx = context(source.clone(), output.clone());
        let artifact = TarXzArchiver::new(&RealRuntime, &runner)
            .archive(&ctx, &BuildMetadata::new("2.0.0", "linux", "amd64"))
            .unwrap();

        assert!(artifact.file_path.is_file());
        assert!(!output.join("nim-2.0.0").exists());
        assert!(entries(&artifact.file_path).contains(&"nim-2.0.0/koch.nim".to_string()));
    }

    #[test]
    fn test_archive_replaces_stale_link() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        source_tree(&source);
        fs::create_dir_all(&output).unwrap();
        std::os::unix::fs::symlink("/nonexistent", output.join("nim-2.0.0")).unwrap();

        let runner = fake_xz();
        let ctx = context(source, output.clone());
        TarXzArchiver::new(&RealRuntime, &runner)
            .archive(&ctx, &BuildMetadata::new("2.0.0", "linux", "amd64"))
            .unwrap();

        assert!(fs::symlink_metadata(output.join("nim-2.0.0")).is_err());
    }

    #[test]
    fn test_archive_refuses_to_clobber_directory() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        source_tree(&source);
        fs::create_dir_all(output.join("nim-2.0.0")).unwrap();

        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();
        let ctx = context(source, output);
        let err = TarXzArchiver::new(&RealRuntime, &runner)
            .archive(&ctx, &BuildMetadata::new("2.0.0", "linux", "amd64"))
            .unwrap_err();
        assert!(err.to_string().contains("is not a symlink"));
    }

    #[test]
    fn test_archive_xz_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Nim");
        let output = dir.path().join("output");
        source_tree(&source);
        fs::create_dir_all(&output).unwrap();

        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|cmd| {
            Err(Error::CommandFailed {
                command: cmd.display_command(),
                code: Some(9),
            }
            .into())
        });
        let ctx = context(source, output.clone());
        let err = TarXzArchiver::new(&RealRuntime, &runner)
            .archive(&ctx, &BuildMetadata::new("2.0.0", "linux", "amd64"))
            .unwrap_err();

        assert!(err.to_string().contains("Failed to compress"));
        assert_eq!(exit_code_of(&err), 9);
        // No cleanup: the uncompressed tar stays behind.
        assert!(output.join("nim-2.0.0.tar").exists());
    }
}
