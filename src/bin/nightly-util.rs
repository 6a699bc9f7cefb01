use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use nightlies::error::exit_code_of;
use nightlies::pipeline::{parse_assignment, propagate_env, propagate_path_prefix, select_backend};
use nightlies::platform::{HostPlatform, arch_from_triple, cpu_count, detect_os, native_path};
use nightlies::process::SystemRunner;
use nightlies::release::default_cc;
use nightlies::runtime::{RealRuntime, Runtime};

/// nightly-util - platform helpers for release pipeline steps
///
/// Under Azure Pipelines (TF_BUILD set) pushenv, pushpath and fold print
/// logging commands for the agent. Anywhere else variables and PATH entries
/// are appended to ./environment for the next step to source.
#[derive(Parser, Debug)]
#[command(author, version = env!("NIGHTLIES_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the host OS (windows, darwin, linux or the kernel name)
    Os,

    /// Print the number of logical CPUs
    Ncpu,

    /// Print the CPU architecture of a target triple (default: what $CC targets)
    Arch {
        #[arg(value_name = "TRIPLE")]
        triple: Option<String>,
    },

    /// Print a path in the form native tools expect
    Nativepath {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Make variables visible to later pipeline steps
    Pushenv {
        #[arg(required = true, value_name = "NAME=VALUE", value_parser = parse_assignment)]
        vars: Vec<(String, String)>,
    },

    /// Prepend directories to PATH for later pipeline steps
    Pushpath {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<String>,
    },

    /// Open or close a collapsible section of the CI log
    Fold {
        #[command(subcommand)]
        action: FoldAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum FoldAction {
    Begin {
        #[arg(value_name = "LABEL")]
        label: String,
    },
    End,
}

fn run<R: Runtime>(runtime: &R, command: Commands) -> Result<()> {
    let runner = SystemRunner;
    let mut stdout = io::stdout();

    match command {
        Commands::Os => writeln!(stdout, "{}", detect_os(runtime, &runner))?,
        Commands::Ncpu => {
            let os = detect_os(runtime, &runner);
            writeln!(stdout, "{}", cpu_count(runtime, &runner, &os))?
        }
        Commands::Arch { triple: Some(triple) } => {
            writeln!(stdout, "{}", arch_from_triple(&triple))?
        }
        Commands::Arch { triple: None } => {
            let cc = match runtime.env_var("CC") {
                Ok(cc) if !cc.is_empty() => cc,
                _ => default_cc(&detect_os(runtime, &runner)).to_string(),
            };
            let host = HostPlatform::detect(runtime, &runner, &cc);
            writeln!(stdout, "{}", host.cpu_arch)?
        }
        Commands::Nativepath { path } => {
            let os = detect_os(runtime, &runner);
            writeln!(stdout, "{}", native_path(&os, &path)?)?
        }
        Commands::Pushenv { vars } => {
            let mut backend = select_backend(runtime, stdout)?;
            propagate_env(backend.as_mut(), &vars)?
        }
        Commands::Pushpath { paths } => {
            let os = detect_os(runtime, &runner);
            let mut backend = select_backend(runtime, stdout)?;
            propagate_path_prefix(runtime, &os, backend.as_mut(), &paths)?
        }
        Commands::Fold { action } => {
            let mut backend = select_backend(runtime, stdout)?;
            match action {
                FoldAction::Begin { label } => backend.begin_fold(&label)?,
                FoldAction::End => backend.end_fold()?,
            }
        }
    }
    Ok(())
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

    match run(&RealRuntime, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code_of(&err).clamp(1, 255) as u8)
        }
    }
}
