//! # Ledger CLI
//!
//! Runs the actor-based ledger from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Run the scripted scenario
//! ledger demo
//!
//! # Same, with a custom configuration and debug logs
//! ledger demo --config ledger.yaml --verbose
//!
//! # Show the effective configuration
//! ledger config
//! ```

use anyhow::Result;
use clap::Parser;
use ledger::{
    cli::{Cli, Commands, handle_config_command, handle_demo_command},
    config::load_config
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("info") };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Config { save }) => handle_config_command(&config, save),
        Some(Commands::Demo) | None => handle_demo_command(config, cli.verbose).await
    }
}
