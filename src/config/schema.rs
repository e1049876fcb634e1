//! Configuration schema for loadforge
//!
//! Configuration is stored at `~/.config/loadforge/config.toml`. Every
//! section is optional; command line flags override file values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Catalog used when none is configured
pub const DEFAULT_CATALOG: &str = "https://registry.k6.io/catalog.json";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings
    pub log: LogConfig,

    /// Build server settings
    pub server: ServerConfig,

    /// Object store server settings
    pub store: StoreConfig,

    /// Build client settings
    pub client: ClientConfig,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// error, warn, info, debug or trace
    pub level: String,

    /// Log format: "text" or "json"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Build server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Dependency catalog, a file path or an http(s) URL
    pub catalog: String,

    /// Store server shared as object store and build cache; local when unset
    pub cache_url: Option<String>,

    /// Directory of the local object store and cache
    pub store_dir: PathBuf,

    /// Listening port
    pub port: u16,

    /// Extra build environment variables
    pub env: HashMap<String, String>,

    /// Allow CGO in builds
    pub enable_cgo: bool,

    /// Copy the server environment into builds
    pub copy_env: bool,

    /// Log toolchain output at info level
    pub verbose: bool,

    /// Abort builds running longer than this (0 = no limit)
    pub build_timeout_secs: u64,

    /// Time given to in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            catalog: DEFAULT_CATALOG.to_string(),
            cache_url: None,
            store_dir: default_data_dir().join("server"),
            port: 8000,
            env: HashMap::new(),
            enable_cgo: false,
            copy_env: true,
            verbose: false,
            build_timeout_secs: 0,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Object store server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Object store directory
    pub store_dir: PathBuf,

    /// Base URL handed out for downloads; `http://localhost:<port>` when unset
    pub download_url: Option<String>,

    /// Listening port
    pub port: u16,

    /// Time given to in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,

    /// Delete objects older than N days (0 = keep forever)
    pub retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: default_data_dir().join("store"),
            download_url: None,
            port: 9000,
            shutdown_timeout_secs: 10,
            retention_days: 0,
        }
    }
}

/// Build client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Build server URL used by `remote`
    pub server: String,

    /// Target platform; the host platform when unset
    pub platform: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8000".to_string(),
            platform: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::temp_dir().join("loadforge")
}
