//! # depot-config
//!
//! Configuration management for Depot.
//!
//! Loads configuration from:
//! 1. `~/.depot/config.toml` (global)
//! 2. Environment variables (highest priority)
//!
//! Binaries layer their own flag overrides on top of the loaded config.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            limits: LimitConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the standard location, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(&global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from an explicit file path, then apply env overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Global config path: ~/.depot/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".depot/config.toml"))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("DEPOT_LISTEN") {
            self.server.listen = addr;
        }
        if let Ok(root) = std::env::var("DEPOT_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(n) = std::env::var("DEPOT_TRANSFER_LIMIT") {
            if let Ok(n) = n.parse() {
                self.limits.transfer = n;
            }
        }
        if let Ok(n) = std::env::var("DEPOT_LIST_LIMIT") {
            if let Ok(n) = n.parse() {
                self.limits.list = n;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:50051".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the stored blobs
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
        }
    }
}

/// Admission gate capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Concurrent upload/download operations
    pub transfer: usize,
    /// Concurrent list operations
    pub list: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            transfer: 10,
            list: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen, "127.0.0.1:50051");
        assert_eq!(config.limits.transfer, 10);
        assert_eq!(config.limits.list, 100);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[limits]"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.listen, parsed.server.listen);
        assert_eq!(config.limits.transfer, parsed.limits.transfer);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[limits]\ntransfer = 2\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.limits.transfer, 2);
        assert_eq!(config.limits.list, 100);
        assert_eq!(config.server.listen, "127.0.0.1:50051");
    }
}
