//! Affinity CLI - run drug-target interaction experiments
//!
//! Provides the `affinity` command: build or reuse a split dataset bundle,
//! optionally search hyperparameters, train, and append scores to a results file.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::types::RunArgs;
use commands::{presets, run};

/// Affinity - reproducible drug-target interaction experiments
#[derive(Parser, Debug)]
#[command(name = "affinity", author, version, about = "Affinity - drug-target interaction experiment runner")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one experiment
    ///
    /// Loads (or builds and caches) the dataset bundle, optionally searches
    /// hyperparameters, trains with optional early stopping or k-fold
    /// cross-validation, and appends one row per task to the results file.
    Run(RunArgs),

    /// List the built-in hyperparameter presets
    Presets {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `--json` output stays machine-readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run(run_args) => run::execute(run_args).await,
        Command::Presets { json } => presets::execute(json),
    }
}
