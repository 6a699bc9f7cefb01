use log::debug;

use super::{Os, arch_from_triple};
use crate::process::{CommandRunner, CommandSpec};
use crate::runtime::Runtime;

/// Facts about the machine the release is built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: Os,
    pub cpu_arch: String,
}

impl HostPlatform {
    /// Detect the host OS and the architecture `cc` targets.
    pub fn detect<R: Runtime, C: CommandRunner>(runtime: &R, runner: &C, cc: &str) -> Self {
        Self {
            os: detect_os(runtime, runner),
            cpu_arch: target_arch(runner, cc),
        }
    }
}

/// Detect the host OS.
///
/// `OS=Windows_NT` marks Windows; everything else is classified by `uname -s`.
/// Falls back to the OS this binary was compiled for when `uname` is unavailable.
pub fn detect_os<R: Runtime, C: CommandRunner>(runtime: &R, runner: &C) -> Os {
    if runtime.env_var("OS").is_ok_and(|os| os == "Windows_NT") {
        return Os::Windows;
    }

    match runner.output(&CommandSpec::new("uname").arg("-s")) {
        Ok(name) if !name.trim().is_empty() => Os::from_kernel_name(&name),
        Ok(_) | Err(_) => {
            debug!("uname unavailable, using compile-time OS");
            Os::compiled_for()
        }
    }
}

/// Logical CPU count, never less than 1.
pub fn cpu_count<R: Runtime, C: CommandRunner>(runtime: &R, runner: &C, os: &Os) -> usize {
    let reported = match os {
        Os::Windows => runtime.env_var("NUMBER_OF_PROCESSORS").ok(),
        Os::Darwin => runner
            .output(&CommandSpec::new("sysctl").args(["-n", "hw.ncpu"]))
            .ok(),
        Os::Linux | Os::Other(_) => runner.output(&CommandSpec::new("nproc")).ok(),
    };

    let count = reported
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0);

    if count <= 0 {
        debug!("CPU count unavailable, assuming 1");
        1
    } else {
        count as usize
    }
}

/// Architecture targeted by the C compiler `cc`, from `cc -dumpmachine`.
///
/// Falls back to the architecture this binary was compiled for.
pub fn target_arch<C: CommandRunner>(runner: &C, cc: &str) -> String {
    match runner.output(&CommandSpec::new(cc).arg("-dumpmachine")) {
        Ok(triple) if !triple.trim().is_empty() => arch_from_triple(&triple).to_string(),
        Ok(_) | Err(_) => {
            debug!("`{} -dumpmachine` failed, using compile-time architecture", cc);
            std::env::consts::ARCH.to_string()
        }
    }
}
