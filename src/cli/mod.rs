//! Command-line surface of the `ledger` binary

pub mod args;
pub mod commands;
pub mod demo;

pub use args::{Cli, Commands};
pub use commands::{handle_config_command, handle_demo_command};
