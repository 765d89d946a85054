//! Daemon configuration
//!
//! Stored as TOML, by default in `~/.config/nvr/config.toml`. Every section
//! and field is optional; missing values take the defaults below.
//!
//! ```toml
//! [server]
//! port = 7480
//!
//! [plugins]
//! dir = "/var/lib/nvr/plugins"
//! start_timeout_secs = 30
//!
//! [plugin.event-archive]
//! max_events = 5000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nvr_plugin_api::PluginConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default port for the management API
pub const DEFAULT_PORT: u16 = 7480;

/// Default bind address for the management API
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NvrConfig {
    pub server: ServerConfig,
    pub plugins: PluginsConfig,
    pub events: EventsConfig,
    pub health: HealthConfig,
    pub storage: StorageConfig,
    /// Per-plugin configuration tables, keyed by plugin id
    #[serde(rename = "plugin")]
    pub plugin: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory scanned for plugin subdirectories
    pub dir: PathBuf,
    /// Start every enabled plugin when the daemon boots
    pub auto_start: bool,
    /// Whether newly installed plugins start out enabled
    pub enabled_by_default: bool,
    pub start_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    /// Log lines kept per plugin
    pub log_capacity: usize,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: nvr_paths::plugins_dir(),
            auto_start: true,
            enabled_by_default: true,
            start_timeout_secs: 30,
            stop_timeout_secs: 30,
            rpc_timeout_secs: 10,
            log_capacity: nvr_plugin_api::logs::DEFAULT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Queue depth per plugin subscription
    pub subscriber_buffer: usize,
    /// Queue depth per live stream client
    pub client_buffer: usize,
    /// Queue between the bus and the stream fanout
    pub fanout_buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            client_buffer: 64,
            fanout_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    pub check_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            check_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON state file
    pub path: PathBuf,
    /// Keep state in memory only
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: nvr_paths::state_file(),
            in_memory: false,
        }
    }
}

impl NvrConfig {
    /// Load configuration from a TOML file
    ///
    /// Returns the defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Orchestration settings derived from this config
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            start_timeout: Duration::from_secs(self.plugins.start_timeout_secs),
            stop_timeout: Duration::from_secs(self.plugins.stop_timeout_secs),
            rpc_timeout: Duration::from_secs(self.plugins.rpc_timeout_secs),
            health_interval: Duration::from_secs(self.health.interval_secs.max(1)),
            health_check_timeout: Duration::from_secs(self.health.check_timeout_secs),
            subscriber_capacity: self.events.subscriber_buffer.max(1),
            client_capacity: self.events.client_buffer.max(1),
            fanout_capacity: self.events.fanout_buffer.max(1),
            log_capacity: self.plugins.log_capacity,
            enabled_by_default: self.plugins.enabled_by_default,
            plugin_configs: self
                .plugin
                .iter()
                .map(|(id, value)| (id.clone(), PluginConfig::from_value(value.clone())))
                .collect(),
        }
    }
}

/// Settings for [`crate::PluginManager`]
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Deadline for `initialize` and for `start`, each
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub rpc_timeout: Duration,
    pub health_interval: Duration,
    pub health_check_timeout: Duration,
    pub subscriber_capacity: usize,
    pub client_capacity: usize,
    pub fanout_capacity: usize,
    pub log_capacity: usize,
    pub enabled_by_default: bool,
    pub plugin_configs: BTreeMap<String, PluginConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        NvrConfig::default().manager_config()
    }
}
