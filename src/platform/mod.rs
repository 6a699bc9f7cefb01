//! Host platform facts: OS, CPU count, architecture and native path form.
//!
//! Queries go through [`Runtime`](crate::runtime::Runtime) and
//! [`CommandRunner`](crate::process::CommandRunner) so the OS-specific
//! branches can be tested on any host.

mod detection;

use std::fmt;

use crate::error::Error;

pub use detection::{HostPlatform, cpu_count, detect_os, target_arch};

/// Operating system family the release is being built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Os {
    Windows,
    Darwin,
    Linux,
    /// Any other kernel, named by its lower-cased `uname -s`.
    Other(String),
}

impl Os {
    /// Classify a kernel name as printed by `uname -s`.
    pub fn from_kernel_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "darwin" => Os::Darwin,
            "linux" => Os::Linux,
            _ => Os::Other(name),
        }
    }

    /// The OS this binary was compiled for, named as `std::env::consts::OS` does.
    pub fn compiled_for() -> Self {
        match std::env::consts::OS {
            "macos" => Os::Darwin,
            "linux" => Os::Linux,
            "windows" => Os::Windows,
            other => Os::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Os::Windows => "windows",
            Os::Darwin => "darwin",
            Os::Linux => "linux",
            Os::Other(name) => name,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Os::Windows)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture part of a target triple: everything before the first `-`.
///
/// A string without `-` is returned whole.
pub fn arch_from_triple(triple: &str) -> &str {
    let triple = triple.trim();
    triple.split_once('-').map_or(triple, |(arch, _)| arch)
}

/// Convert a path to the form native tools on `os` expect.
///
/// Windows gets backslashes; everything else is returned unchanged.
pub fn native_path(os: &Os, path: &str) -> Result<String, Error> {
    if path.is_empty() {
        return Err(Error::invalid_argument("path must not be empty"));
    }
    Ok(match os {
        Os::Windows => path.replace('/', "\\"),
        Os::Darwin | Os::Linux | Os::Other(_) => path.to_string(),
    })
}
