//! Configuration for the hid-elements CLI
//!
//! Stored as TOML. Every field has a default, so a partial or missing file
//! is fine.

use hid_element::{QueueOptions, TransactionOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when neither `RUST_LOG` nor `--log-level` is given
    pub log_level: String,
    /// Options for queues created by the demos
    pub queue: QueueOptions,
    /// Options for transactions created by the demos
    pub transaction: TransactionOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            queue: QueueOptions::default(),
            transaction: TransactionOptions::default(),
        }
    }
}

impl Config {
    /// Default config file location (~/.config/hid-elements/config.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hid-elements")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
