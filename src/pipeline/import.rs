use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::process::{CommandRunner, CommandSpec};
use crate::runtime::Runtime;

/// Variables a shell sets for itself; never part of an imported environment.
const SHELL_INTERNALS: &[&str] = &["_", "PWD", "OLDPWD", "SHLVL"];

/// Source an `environment` file written by a previous step.
///
/// The file is evaluated by `sh` with auto-export on, and every variable
/// whose value differs from this process's environment is returned. A
/// missing file yields an empty overlay.
pub fn import_environment<R: Runtime, C: CommandRunner>(
    runtime: &R,
    runner: &C,
    env_file: &Path,
) -> Result<BTreeMap<String, String>> {
    if !runtime.exists(env_file) {
        debug!("No environment to import at {:?}", env_file);
        return Ok(BTreeMap::new());
    }

    info!("Importing environment from {}", env_file.display());
    let cmd = CommandSpec::new("sh")
        .args(["-c", "set -a && . \"$1\" >&2 && env -0", "sh"])
        .arg(env_file);
    let dump = runner
        .output(&cmd)
        .with_context(|| format!("Failed to source {:?}", env_file))?;

    let current: HashMap<String, String> = runtime.env_vars().into_iter().collect();
    let overlay: BTreeMap<String, String> = parse_env_dump(&dump)
        .filter(|(name, _)| !SHELL_INTERNALS.contains(name))
        .filter(|(name, value)| current.get(*name).map(String::as_str) != Some(*value))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    debug!("Imported variables: {:?}", overlay.keys().collect::<Vec<_>>());
    Ok(overlay)
}

/// Parse the NUL-separated output of `env -0`.
fn parse_env_dump(dump: &str) -> impl Iterator<Item = (&str, &str)> {
    dump.split('\0')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| entry.split_once('='))
}
