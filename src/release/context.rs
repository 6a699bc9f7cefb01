//! Resolved settings for one packaging run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};

use crate::error::Error;
use crate::pipeline::{ENVIRONMENT_FILE, import_environment};
use crate::platform::{HostPlatform, Os, cpu_count, detect_os, target_arch};
use crate::process::{CommandRunner, CommandSpec, OverlayRunner};
use crate::runtime::{Runtime, absolute_path};

/// Options as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Extracted source tree to build.
    pub source: PathBuf,
    /// Where artifacts go (default `<cwd>/output`).
    pub output_dir: Option<PathBuf>,
    /// Where a previous step left its `environment` (default `<cwd>/external`).
    pub deps_dir: Option<PathBuf>,
}

/// Everything a step needs to know, resolved once up front.
///
/// Steps never read the process environment themselves; variables imported
/// from the dependency directory live in `env` and are handed to every
/// external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseContext {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub deps_dir: PathBuf,
    pub host: HostPlatform,
    /// C compiler used to bootstrap.
    pub cc: String,
    pub cflags: Option<String>,
    pub ldflags: Option<String>,
    /// Parallel jobs handed to `make`.
    pub jobs: usize,
    /// Variables imported from `<deps_dir>/environment`.
    pub env: BTreeMap<String, String>,
}

impl ReleaseContext {
    /// Resolve directories, import the dependency environment and pick the toolchain.
    pub fn resolve<R: Runtime, C: CommandRunner>(
        runtime: &R,
        runner: &C,
        options: &ReleaseOptions,
    ) -> Result<Self> {
        let cwd = runtime.current_dir()?;
        let source_dir = absolute_path(&cwd, &options.source);
        let output_dir = absolute_path(
            &cwd,
            options.output_dir.as_deref().unwrap_or(Path::new("output")),
        );
        let deps_dir = absolute_path(
            &cwd,
            options.deps_dir.as_deref().unwrap_or(Path::new("external")),
        );

        if !runtime.is_dir(&source_dir) {
            return Err(Error::invalid_argument(format!(
                "source directory {} does not exist",
                source_dir.display()
            ))
            .into());
        }

        let env = import_environment(runtime, runner, &deps_dir.join(ENVIRONMENT_FILE))?;
        let lookup = |key: &str| -> Option<String> {
            env.get(key)
                .cloned()
                .or_else(|| runtime.env_var(key).ok())
                .filter(|value| !value.is_empty())
        };

        // Host detection runs with the imported environment, PATH included.
        let detect = OverlayRunner::new(runner, &env);
        let os = detect_os(runtime, &detect);
        let cc = lookup("CC").unwrap_or_else(|| default_cc(&os).to_string());
        let cflags = lookup("CFLAGS");
        let ldflags = lookup("LDFLAGS");
        let jobs = cpu_count(runtime, &detect, &os);
        let cpu_arch = target_arch(&detect, &cc);

        info!(
            "Building {} on {}/{} with {} ({} jobs)",
            source_dir.display(),
            os,
            cpu_arch,
            cc,
            jobs
        );
        debug!("Output: {:?}, deps: {:?}", output_dir, deps_dir);

        Ok(Self {
            source_dir,
            output_dir,
            deps_dir,
            host: HostPlatform { os, cpu_arch },
            cc,
            cflags,
            ldflags,
            jobs,
            env,
        })
    }

    /// A command rooted in the source tree carrying the run's environment.
    pub fn command(&self, program: impl AsRef<Path>) -> CommandSpec {
        let mut cmd = CommandSpec::new(program)
            .cwd(&self.source_dir)
            .envs(&self.env)
            .env("CC", &self.cc);
        if let Some(ref cflags) = self.cflags {
            cmd = cmd.env("CFLAGS", cflags);
        }
        if let Some(ref ldflags) = self.ldflags {
            cmd = cmd.env("LDFLAGS", ldflags);
        }
        cmd
    }

    /// Path of an executable inside the source tree, e.g. `bin/nim`.
    pub fn source_exe(&self, relative: &str) -> PathBuf {
        let suffix = if self.host.os.is_windows() { ".exe" } else { "" };
        self.source_dir.join(format!("{}{}", relative, suffix))
    }
}

/// Compiler used when neither the environment nor the dependency step chose one.
pub fn default_cc(os: &Os) -> &'static str {
    match os {
        Os::Darwin => "clang",
        Os::Windows | Os::Linux | Os::Other(_) => "gcc",
    }
}
