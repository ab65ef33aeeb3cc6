//! CLI argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log every actor event, not just notifications
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a YAML runtime configuration (defaults to the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scripted accounts, transfers and maturity scenario
    Demo,
    /// Print the effective runtime configuration as YAML
    Config {
        /// Also write it to the user config file
        #[arg(long)]
        save: bool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demo_with_config() {
        let cli = Cli::parse_from(["ledger", "demo", "--config", "ledger.yaml", "-v"]);

        assert!(matches!(cli.command, Some(Commands::Demo)));
        assert_eq!(cli.config, Some(PathBuf::from("ledger.yaml")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_config_save() {
        let cli = Cli::parse_from(["ledger", "config", "--save"]);

        assert!(matches!(cli.command, Some(Commands::Config { save: true })));
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["ledger"]);

        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }
}
