//! Error types for nvr-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::plugins::{ManagerError, ManifestError};

pub use nvr_plugin_api::StoreError;

/// Top-level error type for nvr-core
#[derive(Error, Debug)]
pub enum NvrError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] ManagerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = NvrError> = std::result::Result<T, E>;
