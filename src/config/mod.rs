// Configuration Management Module
// Handles vstats.toml loading, defaults, and validation

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use tracing::{info, warn};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Aggregate counters (JSON)
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Rendered report
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_merge_delay")]
    pub merge_delay_secs: u64,

    #[serde(default = "default_persist_interval")]
    pub persist_interval_secs: u64,

    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_coarse_tick")]
    pub coarse_tick_secs: u64,

    #[serde(default = "default_fine_tick")]
    pub fine_tick_secs: u64,

    #[serde(default = "default_validation_timeout")]
    pub validation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// vMenu-style addons.json with a `vehicles` array
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Player tokens allowed to reset statistics
    #[serde(default)]
    pub tokens: Vec<String>,
}

// Default value functions
fn default_bind_addr() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 30125 }
fn default_data_file() -> PathBuf { PathBuf::from("vehicleData.json") }
fn default_report_file() -> PathBuf { PathBuf::from("stats.html") }
fn default_merge_delay() -> u64 { 5 }
fn default_persist_interval() -> u64 { 5 }
fn default_report_interval() -> u64 { 3600 }
fn default_top_n() -> usize { 10 }
fn default_coarse_tick() -> u64 { 60 }
fn default_fine_tick() -> u64 { 1 }
fn default_validation_timeout() -> u64 { 30 }
fn default_catalog_path() -> PathBuf { PathBuf::from("vMenu/config/addons.json") }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            report_file: default_report_file(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            merge_delay_secs: default_merge_delay(),
            persist_interval_secs: default_persist_interval(),
            report_interval_secs: default_report_interval(),
            top_n: default_top_n(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            coarse_tick_secs: default_coarse_tick(),
            fine_tick_secs: default_fine_tick(),
            validation_timeout_secs: default_validation_timeout(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

impl StatsConfig {
    /// Load configuration from file or use defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let contents = std::fs::read_to_string(path)
                .context("Failed to read configuration file")?;

            let config: StatsConfig = toml::from_str(&contents)
                .context("Failed to parse configuration file")?;

            config.validate()?;
            Ok(config)
        } else {
            warn!("Configuration file not found, using defaults");
            info!("Create vstats.toml to customize configuration");
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.storage.data_file.as_os_str().is_empty() {
            anyhow::bail!("Data file path cannot be empty");
        }

        if self.storage.report_file.as_os_str().is_empty() {
            anyhow::bail!("Report file path cannot be empty");
        }

        if self.catalog.path.as_os_str().is_empty() {
            anyhow::bail!("Catalog path cannot be empty");
        }

        if self.aggregator.merge_delay_secs == 0 {
            anyhow::bail!("Merge delay must be at least 1 second");
        }

        if self.aggregator.report_interval_secs == 0 {
            anyhow::bail!("Report interval must be at least 1 second");
        }

        if self.aggregator.top_n == 0 {
            anyhow::bail!("Leaderboard size must be at least 1");
        }

        if self.tracker.fine_tick_secs == 0 || self.tracker.coarse_tick_secs == 0 {
            anyhow::bail!("Tracker tick intervals must be at least 1 second");
        }

        if self.tracker.fine_tick_secs >= self.tracker.coarse_tick_secs {
            anyhow::bail!("Fine tick must be shorter than coarse tick");
        }

        if self.tracker.validation_timeout_secs == 0 {
            anyhow::bail!("Validation timeout must be at least 1 second");
        }

        if self.admin.tokens.iter().any(|t| t.trim().is_empty()) {
            anyhow::bail!("Admin tokens cannot be blank");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StatsConfig::default();
        assert_eq!(config.server.port, 30125);
        assert_eq!(config.aggregator.merge_delay_secs, 5);
        assert_eq!(config.tracker.coarse_tick_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_tick_order() {
        let mut config = StatsConfig::default();
        config.tracker.fine_tick_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vstats.toml");
        std::fs::write(&path, "[aggregator]\nmerge_delay_secs = 2\n\n[admin]\ntokens = [\"abc\"]\n").unwrap();

        let config = StatsConfig::load(&path).unwrap();
        assert_eq!(config.aggregator.merge_delay_secs, 2);
        assert_eq!(config.aggregator.persist_interval_secs, 5);
        assert_eq!(config.admin.tokens, vec!["abc".to_string()]);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = StatsConfig::load(temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.data_file, PathBuf::from("vehicleData.json"));
    }
}
