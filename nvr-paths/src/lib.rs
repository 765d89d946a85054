//! XDG Base Directory paths for nvr.
//!
//! The daemon keeps its config file and plugin directories under the XDG
//! config home and its persisted state under the XDG data home, on every
//! platform.

use std::path::PathBuf;

const APP_DIR: &str = "nvr";

/// Get the nvr config directory.
///
/// Returns `$XDG_CONFIG_HOME/nvr` if set, otherwise `~/.config/nvr`.
///
/// # Examples
///
/// ```
/// use nvr_paths::config_dir;
///
/// let config = config_dir();
/// let config_file = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".config").join(APP_DIR)
    }
}

/// Get the nvr data directory.
///
/// Returns `$XDG_DATA_HOME/nvr` if set, otherwise `~/.local/share/nvr`.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share").join(APP_DIR)
    } else {
        PathBuf::from(".local/share").join(APP_DIR)
    }
}

/// Default config file location.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory scanned for installed plugins (one subdirectory per plugin).
pub fn plugins_dir() -> PathBuf {
    config_dir().join("plugins")
}

/// Default key-value state file backing the persistence collaborator.
pub fn state_file() -> PathBuf {
    data_dir().join("state.json")
}
