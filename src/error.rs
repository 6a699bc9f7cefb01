//! Error types shared by the utility library and the packager.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value violates a precondition (empty path, newline in a value).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An external command ran but exited unsuccessfully.
    #[error("`{command}` failed with exit code {}", display_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    /// An external step reported success but its expected output is missing.
    #[error("expected artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// An external command printed something we could not interpret.
    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Exit status a binary should terminate with when this error reaches `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Map any error chain to a process exit status, propagating a failed child's code.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(1, Error::exit_code)
}
