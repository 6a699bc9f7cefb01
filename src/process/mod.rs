//! Subprocess execution.
//!
//! Every external tool the packager drives (`make`, the freshly built
//! compiler, `koch`, `xz`, `sh`) goes through [`CommandRunner`], so the
//! workflow can be exercised against a mock in tests.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use log::debug;

use crate::error::Error;

/// Description of a command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<Path>) -> Self {
        CommandSpec {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables; later entries win.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self.env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn get_program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

/// Executes external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with inherited stdio; a non-zero exit is an
    /// [`Error::CommandFailed`].
    fn run(&self, cmd: &CommandSpec) -> Result<()>;

    /// Run to completion and capture stdout (stderr stays inherited).
    fn output(&self, cmd: &CommandSpec) -> Result<String>;
}

/// Runs commands as real child processes.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    #[tracing::instrument(skip(self, cmd), fields(command = %cmd.display_command()))]
    fn run(&self, cmd: &CommandSpec) -> Result<()> {
        debug!("Running `{}`", cmd.display_command());
        let status = cmd
            .build_command()
            .status()
            .with_context(|| format!("Failed to execute `{}`", cmd.program.display()))?;

        if !status.success() {
            return Err(Error::CommandFailed {
                command: cmd.display_command(),
                code: status.code(),
            }
            .into());
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, cmd), fields(command = %cmd.display_command()))]
    fn output(&self, cmd: &CommandSpec) -> Result<String> {
        debug!("Capturing output of `{}`", cmd.display_command());
        let output = cmd
            .build_command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("Failed to execute `{}`", cmd.program.display()))?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: cmd.display_command(),
                code: output.status.code(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs commands through another runner with extra environment variables
/// underneath each command's own.
pub struct OverlayRunner<'a, C: CommandRunner> {
    inner: &'a C,
    env: &'a BTreeMap<String, String>,
}

impl<'a, C: CommandRunner> OverlayRunner<'a, C> {
    pub fn new(inner: &'a C, env: &'a BTreeMap<String, String>) -> Self {
        Self { inner, env }
    }

    fn apply(&self, cmd: &CommandSpec) -> CommandSpec {
        let mut cmd = cmd.clone();
        for (key, value) in self.env {
            cmd.env
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        cmd
    }
}

impl<C: CommandRunner> CommandRunner for OverlayRunner<'_, C> {
    fn run(&self, cmd: &CommandSpec) -> Result<()> {
        self.inner.run(&self.apply(cmd))
    }

    fn output(&self, cmd: &CommandSpec) -> Result<String> {
        self.inner.output(&self.apply(cmd))
    }
}
