//! Configuration management for loadforge

pub mod schema;

pub use schema::Config;

use crate::error::{ForgeError, ForgeResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
    /// Whether the path was given explicitly; a missing explicit file is an error
    explicit: bool,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            explicit: false,
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            explicit: true,
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loadforge")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub async fn load(&self) -> ForgeResult<Config> {
        if !self.config_path.exists() {
            if self.explicit {
                return Err(ForgeError::Config(format!(
                    "config file {} does not exist",
                    self.config_path.display()
                )));
            }
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ForgeResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ForgeError::io(format!("reading config from {}", path.display()), e))?;

        let config = toml::from_str(&content).map_err(|e| ForgeError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager {
            config_path: temp.path().join("nonexistent.toml"),
            explicit: false,
        };

        let config = manager.load().await.unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("nonexistent.toml"));

        assert!(matches!(manager.load().await, Err(ForgeError::Config(_))));
    }

    #[tokio::test]
    async fn loads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[store]\nport = 9100\nretention_days = 7\n").unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(config.store.port, 9100);
        assert_eq!(config.store.retention_days, 7);
    }

    #[tokio::test]
    async fn invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[store]\nport = \"not a number\"\n").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        assert!(matches!(err, ForgeError::ConfigInvalid { path: p, .. } if p == path));
    }
}
