use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::account::Amount;

/// Runtime configuration for the broker and the actor behaviours
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deadlines for every correlated round-trip
    pub timeouts:       TimeoutConfig,
    /// Transfer protocol policies
    pub transfer:       TransferConfig,
    /// Funds accrual settings
    pub funds:          FundsConfig,
    /// Buffered notifications per event-stream subscriber
    pub event_capacity: usize
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeouts:       TimeoutConfig::default(),
            transfer:       TransferConfig::default(),
            funds:          FundsConfig::default(),
            event_capacity: 256
        }
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Broker waiting for a forward target to answer
    pub forward_ms:         u64,
    /// Each round-trip of the transfer protocol
    pub transfer_step_ms:   u64,
    /// Funds maturity deposit leg
    pub mature_deposit_ms:  u64,
    /// Funds maturity self-deletion
    pub mature_delete_ms:   u64,
    /// Driver requests made through the ledger facade
    pub request_ms:         u64
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { forward_ms: 2000, transfer_step_ms: 2000, mature_deposit_ms: 1000, mature_delete_ms: 3000, request_ms: 5000 }
    }
}

impl TimeoutConfig {
    pub fn forward(&self) -> Duration {
        Duration::from_millis(self.forward_ms)
    }

    pub fn transfer_step(&self) -> Duration {
        Duration::from_millis(self.transfer_step_ms)
    }

    pub fn mature_deposit(&self) -> Duration {
        Duration::from_millis(self.mature_deposit_ms)
    }

    pub fn mature_delete(&self) -> Duration {
        Duration::from_millis(self.mature_delete_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

/// What the transfer protocol does when the source's metadata lookup times out
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetadataLookupPolicy {
    /// Treat the source as an unknown kind and proceed
    #[default]
    FailOpen,
    /// Abort the transfer with the lookup error
    FailClosed
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Destinations with this prefix skip the existence probe; empty disables the skip
    pub ephemeral_prefix:          String,
    pub metadata_lookup:           MetadataLookupPolicy,
    /// Credit the amount back to the source when the deposit leg fails
    pub compensate_failed_deposit: bool
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ephemeral_prefix:          "temp-".to_string(),
            metadata_lookup:           MetadataLookupPolicy::FailOpen,
            compensate_failed_deposit: false
        }
    }
}

impl TransferConfig {
    pub fn is_ephemeral(&self, account_id: &str) -> bool {
        !self.ephemeral_prefix.is_empty() && account_id.starts_with(&self.ephemeral_prefix)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FundsConfig {
    /// Bonus applied to the post-deposit balance
    pub interest_rate: f64
}

impl Default for FundsConfig {
    fn default() -> Self {
        Self { interest_rate: 0.10 }
    }
}

impl FundsConfig {
    /// Balance after depositing `amount` into `balance`.
    pub fn accrue(&self, balance: Amount, amount: Amount) -> Amount {
        (balance + amount) * (1.0 + self.interest_rate)
    }
}

/// Get the project directories for cross-platform config path resolution
pub fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "ledger-actors").context("Failed to determine project directories")
}

/// Get the configuration directory path
pub fn get_config_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    Ok(project_dirs.config_dir().to_path_buf())
}

/// Get the config file path
pub fn get_config_file_path() -> Result<PathBuf> {
    let config_dir = get_config_dir()?;
    Ok(config_dir.join("config.yaml"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the platform config file is used
/// when present, otherwise defaults.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => read_config(path),
        None => match get_config_file_path() {
            Ok(default_path) if default_path.exists() => read_config(&default_path),
            _ => Ok(RuntimeConfig::default())
        }
    }
}

fn read_config(path: &Path) -> Result<RuntimeConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Save configuration to file
pub fn save_config(config: &RuntimeConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content = serde_yaml::to_string(config).context("Failed to serialize config")?;

    fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}
