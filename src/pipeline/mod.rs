//! Passing state to later pipeline steps.
//!
//! Two backends exist. Under Azure Pipelines (`TF_BUILD` set) variables and
//! PATH entries are announced through logging commands on stdout and the
//! agent applies them to subsequent steps. Anywhere else they are appended to
//! a shell snippet named `environment` in the current directory, which the
//! next step sources (see [`import_environment`]).
//!
//! Values and paths are validated before a backend sees anything, and the
//! file backend checks names before writing, so a rejected call never leaves
//! partial output behind.

mod azure;
mod file;
mod import;

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::error::Error;
use crate::platform::{Os, native_path};
use crate::runtime::{Runtime, absolute_path};

pub use azure::AzurePipelines;
pub use file::{ENVIRONMENT_FILE, EnvironmentFile};
pub use import::import_environment;

/// Variable whose presence means we run on an Azure Pipelines agent.
pub const CI_MARKER: &str = "TF_BUILD";

/// Sink for variables, PATH prefixes and log folds.
#[cfg_attr(test, mockall::automock)]
pub trait PipelineBackend {
    /// Export `(name, value)` pairs with validated values, in order.
    fn export_vars(&mut self, pairs: &[(String, String)]) -> Result<()>;

    /// Prepend already resolved directories to PATH, in order.
    fn prepend_paths(&mut self, paths: &[String]) -> Result<()>;

    fn begin_fold(&mut self, label: &str) -> Result<()>;

    fn end_fold(&mut self) -> Result<()>;
}

/// Whether the CI orchestrator is driving this process.
pub fn running_under_ci<R: Runtime>(runtime: &R) -> bool {
    runtime.env_var(CI_MARKER).is_ok()
}

/// Pick the backend once, from the CI marker.
///
/// CI directives and file-backend notices are written to `out`.
pub fn select_backend<'a, R: Runtime, W: Write + 'a>(
    runtime: &'a R,
    out: W,
) -> Result<Box<dyn PipelineBackend + 'a>> {
    if running_under_ci(runtime) {
        Ok(Box::new(AzurePipelines::new(out)))
    } else {
        let dir = runtime.current_dir()?;
        Ok(Box::new(EnvironmentFile::new(runtime, &dir, out)))
    }
}

/// Make variables visible to later pipeline steps.
///
/// Every value is checked before anything is emitted and must not contain
/// a newline. Name rules are up to the backend.
pub fn propagate_env<B: PipelineBackend + ?Sized>(
    backend: &mut B,
    pairs: &[(String, String)],
) -> Result<()> {
    for (name, value) in pairs {
        if value.contains('\n') {
            return Err(Error::invalid_argument(format!(
                "value of {} must not contain a newline",
                name
            ))
            .into());
        }
    }
    backend.export_vars(pairs)
}

/// Prepend directories to PATH for later pipeline steps.
///
/// Each path is made absolute against the current directory and converted
/// to the native form of `os`. Empty paths and resolved paths containing a
/// newline are rejected before anything is emitted.
pub fn propagate_path_prefix<R: Runtime, B: PipelineBackend + ?Sized>(
    runtime: &R,
    os: &Os,
    backend: &mut B,
    paths: &[String],
) -> Result<()> {
    if paths.iter().any(|p| p.is_empty()) {
        return Err(Error::invalid_argument("path must not be empty").into());
    }

    let cwd = runtime.current_dir()?;
    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
        let absolute = absolute_path(&cwd, Path::new(path));
        let native = native_path(os, &absolute.to_string_lossy())?;
        if native.contains('\n') {
            return Err(Error::invalid_argument(format!(
                "path must not contain a newline: {:?}",
                native
            ))
            .into());
        }
        resolved.push(native);
    }
    backend.prepend_paths(&resolved)
}

/// Run `step` inside a log fold labelled `label`.
///
/// The fold is only closed when the step succeeds; a failing step leaves it
/// open so the agent shows the failure expanded.
pub fn folded<B: PipelineBackend + ?Sized, T>(
    backend: &mut B,
    label: &str,
    step: impl FnOnce() -> Result<T>,
) -> Result<T> {
    backend.begin_fold(label)?;
    let value = step()?;
    backend.end_fold()?;
    Ok(value)
}

/// Quote `value` for a POSIX shell: single quotes, with `'` written as `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Split a `NAME=VALUE` assignment as accepted on the command line.
pub fn parse_assignment(assignment: &str) -> Result<(String, String), Error> {
    match assignment.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(Error::invalid_argument(format!(
            "expected NAME=VALUE, got {:?}",
            assignment
        ))),
    }
}
