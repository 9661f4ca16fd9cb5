//! gmmverify - GMM-UBM verification from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{EnrolCommand, RunCommand, TrainUbmCommand};

/// gmmverify - GMM-UBM speaker/face verification.
///
/// Typical workflow:
///   - train-ubm: fit a background model on pooled feature files
///   - enrol:     MAP-adapt a client model from enrolment files
///   - run:       score a whole evaluation group from a manifest
///
/// Feature, model and statistics files are JSON, MessagePack or YAML,
/// chosen by file extension.
#[derive(Parser)]
#[command(name = "gmmverify")]
#[command(about = "GMM-UBM verification CLI")]
#[command(version)]
pub struct Cli {
    /// Experiment config file (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a background model (UBM)
    #[command(name = "train-ubm")]
    TrainUbm(TrainUbmCommand),
    /// Adapt a client model from enrolment data
    Enrol(EnrolCommand),
    /// Run a verification experiment over a group
    Run(RunCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match &cli.command {
        Commands::TrainUbm(cmd) => cmd.run(&cli),
        Commands::Enrol(cmd) => cmd.run(&cli),
        Commands::Run(cmd) => cmd.run(&cli),
    }
}
