use crate::error::Error;

/// Program evaluated by the freshly built compiler to describe itself.
pub const METADATA_PROGRAM: &str = "echo NimVersion; echo hostOS; echo hostCPU";

/// What the built compiler reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    pub version: String,
    pub host_os: String,
    pub host_cpu: String,
    /// `-<host_os>_<host_cpu>`
    pub archive_suffix: String,
}

impl BuildMetadata {
    pub fn new(version: &str, host_os: &str, host_cpu: &str) -> Self {
        Self {
            version: version.to_string(),
            host_os: host_os.to_string(),
            host_cpu: host_cpu.to_string(),
            archive_suffix: format!("-{}_{}", host_os, host_cpu),
        }
    }

    /// Parse the three lines printed by [`METADATA_PROGRAM`].
    pub fn parse(output: &str, command: &str) -> Result<Self, Error> {
        let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
        match (lines.next(), lines.next(), lines.next()) {
            (Some(version), Some(os), Some(cpu)) => Ok(Self::new(version, os, cpu)),
            _ => Err(Error::UnexpectedOutput {
                command: command.to_string(),
                output: output.to_string(),
            }),
        }
    }

    /// Root directory name inside the release archive.
    pub fn release_name(&self) -> String {
        format!("nim-{}", self.version)
    }
}
