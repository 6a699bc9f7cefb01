use std::io::Write;

use anyhow::{Context, Result};

use super::PipelineBackend;

/// Azure Pipelines logging commands.
pub struct AzurePipelines<W: Write> {
    out: W,
}

impl<W: Write> AzurePipelines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line).context("Failed to write pipeline command")?;
        self.out.flush().context("Failed to flush pipeline command")
    }
}

impl<W: Write> PipelineBackend for AzurePipelines<W> {
    fn export_vars(&mut self, pairs: &[(String, String)]) -> Result<()> {
        for (name, value) in pairs {
            self.emit(&format!("##vso[task.setvariable variable={}]{}", name, value))?;
        }
        Ok(())
    }

    fn prepend_paths(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            self.emit(&format!("##vso[task.prependpath]{}", path))?;
        }
        Ok(())
    }

    fn begin_fold(&mut self, label: &str) -> Result<()> {
        self.emit(&format!("##[group]{}", label))
    }

    fn end_fold(&mut self) -> Result<()> {
        self.emit("##[endgroup]")
    }
}
