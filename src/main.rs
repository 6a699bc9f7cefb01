use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use nightlies::error::exit_code_of;
use nightlies::process::SystemRunner;
use nightlies::release::{ReleaseOptions, build_release};
use nightlies::runtime::RealRuntime;

/// build-release - build and package a Nim release
///
/// Bootstraps the compiler from an extracted source tree, builds the tools
/// and documentation, then packages everything: a zip on Windows, a
/// `.tar.xz` elsewhere. The artifact path is printed and written to
/// `<output>/nim.txt`.
///
/// If `<deps>/environment` exists it is sourced first, so CC, CFLAGS, LDFLAGS
/// and PATH set by an earlier step apply to the build.
#[derive(Parser, Debug)]
#[command(author, version = env!("NIGHTLIES_VERSION"), about)]
struct Cli {
    /// Where to put the release archive [default: ./output]
    #[arg(short = 'o', value_name = "FOLDER")]
    output: Option<PathBuf>,

    /// Where the dependency step left its `environment` [default: ./external]
    #[arg(short = 'd', value_name = "FOLDER")]
    deps: Option<PathBuf>,

    /// Extracted source tree to build
    #[arg(value_name = "SOURCE")]
    source: PathBuf,
}

impl From<Cli> for ReleaseOptions {
    fn from(cli: Cli) -> Self {
        ReleaseOptions {
            source: cli.source,
            output_dir: cli.output,
            deps_dir: cli.deps,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match build_release(&RealRuntime, &SystemRunner, &cli.into()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code_of(&err).clamp(1, 255) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_source_only() {
        let cli = Cli::try_parse_from(["build-release", "Nim"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("Nim"));
        assert_eq!(cli.output, None);
        assert_eq!(cli.deps, None);
    }

    #[test]
    fn test_cli_all_options() {
        let cli =
            Cli::try_parse_from(["build-release", "-o", "dist", "-d", "/deps", "nim-2.0.0"])
                .unwrap();
        let options = ReleaseOptions::from(cli);
        assert_eq!(options.source, PathBuf::from("nim-2.0.0"));
        assert_eq!(options.output_dir, Some(PathBuf::from("dist")));
        assert_eq!(options.deps_dir, Some(PathBuf::from("/deps")));
    }

    #[test]
    fn test_cli_missing_source_fails() {
        let err = Cli::try_parse_from(["build-release", "-o", "dist"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_unknown_flag_fails() {
        let err = Cli::try_parse_from(["build-release", "-x", "Nim"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_help() {
        let err = Cli::try_parse_from(["build-release", "-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
