//! ALG harness CLI
//!
//! Runs end-to-end suites against the ALG gateway and its NE/NEM
//! simulators, plus a few one-shot helpers used while writing suites.

use alg_harness::common::logging;
use alg_harness::{cli, commands};
use clap::Parser;
use commands::Commands;

#[derive(Parser)]
#[command(name = "alg-harness", about = "End-to-end test harness for the ALG gateway")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // A run logs into its own report directory once that exists
    if !matches!(cli.command, Commands::Run { .. }) {
        logging::init_cli();
    }

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
