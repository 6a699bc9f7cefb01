use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use super::{PipelineBackend, shell_quote};
use crate::error::Error;
use crate::runtime::Runtime;

/// Name of the snippet written for (and read from) neighbouring steps.
pub const ENVIRONMENT_FILE: &str = "environment";

/// Appends `export` statements to an `environment` file.
pub struct EnvironmentFile<'a, R: Runtime, W: Write> {
    runtime: &'a R,
    path: PathBuf,
    notices: W,
    announced: bool,
}

impl<'a, R: Runtime, W: Write> EnvironmentFile<'a, R, W> {
    /// Write to `<dir>/environment`; the first append prints a notice to `notices`.
    pub fn new(runtime: &'a R, dir: &Path, notices: W) -> Self {
        Self {
            runtime,
            path: dir.join(ENVIRONMENT_FILE),
            notices,
            announced: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, text: &str) -> Result<()> {
        if !self.announced {
            writeln!(
                self.notices,
                "Not running under CI, environment will be written to {}",
                self.path.display()
            )
            .context("Failed to print environment notice")?;
            self.announced = true;
        }
        debug!("Appending to {:?}: {}", self.path, text.trim_end());
        self.runtime
            .append(&self.path, text.as_bytes())
            .with_context(|| format!("Failed to update {:?}", self.path))
    }
}

impl<R: Runtime, W: Write> PipelineBackend for EnvironmentFile<'_, R, W> {
    /// Names must be shell identifiers; all are checked before the file is touched.
    fn export_vars(&mut self, pairs: &[(String, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        if let Some((name, _)) = pairs.iter().find(|(name, _)| !is_shell_name(name)) {
            return Err(Error::invalid_argument(format!("invalid variable name: {:?}", name)).into());
        }
        let text: String = pairs
            .iter()
            .map(|(name, value)| format!("export {}={}\n", name, shell_quote(value)))
            .collect();
        self.append(&text)
    }

    /// Emits a single `export PATH=...` line. Each path is prepended in turn,
    /// so the last one given ends up first, as with repeated CI prepends.
    fn prepend_paths(&mut self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let prefix = paths.iter().fold(String::new(), |acc, path| {
            if acc.is_empty() {
                shell_quote(path)
            } else {
                format!("{}:{}", shell_quote(path), acc)
            }
        });
        self.append(&format!("export PATH={}\"${{PATH:+:$PATH}}\"\n", prefix))
    }

    fn begin_fold(&mut self, _label: &str) -> Result<()> {
        Ok(())
    }

    fn end_fold(&mut self) -> Result<()> {
        Ok(())
    }
}

fn is_shell_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
