//! infratest - run YAML-described infrastructure test flows
//!
//! Drives terraform through a sequence of steps, verifies the deployed
//! resources and endpoints, and always attempts cleanup.

use clap::Parser;
use infratest::common::logging;
use infratest::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "infratest", about = "Infrastructure testing tool")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Commands::Run { debug, .. } = &cli.command;
    logging::init_cli(*debug);

    match cli::dispatch(cli.command).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
