//! Parameter sweep CLI
//!
//! Drives an external program across a sweep of input values and prints the
//! harvested results as a table.

use std::path::PathBuf;

use clap::Parser;
use paramsweep::cli::{self, Status};
use paramsweep::commands::Commands;
use paramsweep::common::{config::Config, logging};

#[derive(Parser)]
#[command(name = "paramsweep", about = "Run a program across a parameter sweep and tabulate its results")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_guard = logging::init_cli(cli.log_file.as_deref());

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => cli::dispatch(cli.command, &config).await,
        Err(e) => Err(e),
    };

    let code = match result {
        Ok(Status::Complete) => 0,
        Ok(Status::Incomplete) => 2,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {e}");
            1
        }
    };

    // process::exit skips destructors; flush the log file first
    drop(log_guard);
    std::process::exit(code);
}
