//! CLI command handlers

use std::time::Duration;

use anyhow::{Context, Result};

use super::demo;
use crate::{
    actor::Ledger,
    config::{self, RuntimeConfig}
};

/// Run the scripted scenario and print its notifications and final balances.
pub async fn handle_demo_command(config: RuntimeConfig, verbose: bool) -> Result<()> {
    let ledger = Ledger::start(config).await.context("Failed to start the ledger")?;
    let printer = demo::print_notifications(&ledger, verbose);

    let report = demo::run(&ledger, &demo::scripted()).await.context("Demo scenario failed")?;

    println!();
    println!("Final balances:");
    for (id, balance) in &report.balances {
        match balance {
            Some(balance) => println!("  {}: {}", id, balance),
            None => println!("  {}: (closed)", id)
        }
    }
    println!("Stopped {} actors", report.terminated);

    ledger.stop(Duration::from_secs(2)).await.context("Failed to stop the ledger")?;
    // The stream closes once the broker state is dropped; don't hang on it
    if let Ok(joined) = tokio::time::timeout(Duration::from_millis(500), printer).await {
        joined.context("Notification printer panicked")?;
    }
    Ok(())
}

/// Print the effective configuration, optionally persisting it.
pub fn handle_config_command(config: &RuntimeConfig, save: bool) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);

    if save {
        let path = config::get_config_file_path()?;
        config::save_config(config, &path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
