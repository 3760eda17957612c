mod commands;
mod helpers;

use clap::Parser;
use labcalc_core::domain::{LabError, LabErrorKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let lab_error = error.as_lab_error();
            eprintln!("{}", lab_error.diagnostic_line());
            lab_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("labcalc".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_tracing(cli.global.verbose);
            dispatch_parsed(cli.global, cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Logs go to stderr so stdout stays parseable with `--json`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A subscriber may already be installed when `run` is called in-process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(name = "labcalc", about = "Laboratory dilution and experiment-design calculators")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct GlobalArgs {
    /// Reagent store file
    #[arg(long, global = true, default_value = labcalc_core::modules::reagents::DEFAULT_STORE_FILE)]
    pub(crate) store: PathBuf,

    /// Dilution policy JSON file (defaults apply when omitted)
    #[arg(long, global = true)]
    pub(crate) policy: Option<PathBuf>,

    /// Write the result tables as CSV files into this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) csv_dir: Option<PathBuf>,

    /// Print the result record as JSON instead of tables
    #[arg(long, global = true)]
    pub(crate) json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Single-step dilution with an optional solid stock preparation
    Dilute(commands::DiluteArgs),
    /// Constant-volume serial dilution series
    Serial(commands::SerialArgs),
    /// Multi-range dose-response (IC50) dilution plan
    Ic50(commands::CascadeArgs),
    /// Design-of-experiments matrices
    #[command(subcommand)]
    Doe(commands::DoeCommand),
    /// Manage the reagent store
    #[command(subcommand)]
    Reagents(commands::ReagentCommand),
    /// List recognized units and solvent options
    Units,
}

fn dispatch_parsed(global: GlobalArgs, command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Dilute(args) => commands::run_dilute_command(&global, args),
        CliCommand::Serial(args) => commands::run_serial_command(&global, args),
        CliCommand::Ic50(args) => commands::run_cascade_command(&global, args),
        CliCommand::Doe(command) => commands::run_doe_command(&global, command),
        CliCommand::Reagents(command) => commands::run_reagent_command(&global, command),
        CliCommand::Units => commands::run_units_command(&global),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Lab(LabError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<LabError> for CliError {
    fn from(error: LabError) -> Self {
        Self::Lab(error)
    }
}

impl CliError {
    fn as_lab_error(&self) -> LabError {
        match self {
            Self::Usage(message) => LabError::new(LabErrorKind::Usage, message.trim_end()),
            Self::Lab(error) => error.clone(),
            Self::Internal(error) => LabError::new(LabErrorKind::Io, format!("{error:#}")),
        }
    }
}
