//! netreach - SSH reachability tests across cluster networks
//!
//! Runs a plan of expected SSH connectivity between node types over each
//! network and reports every case that disagrees with the plan.

use std::path::PathBuf;

use clap::Parser;
use netreach::common::config::Config;
use netreach::common::logging;
use netreach::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "netreach", about = "SSH reachability tests across cluster networks")]
#[command(version, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: <config dir>/netreach/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
