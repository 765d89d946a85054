//! Error types for plugin authors

use thiserror::Error;

use crate::store::StoreError;

/// Errors that plugins can return, and that the runtime returns to plugins
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),

    /// Invalid input error (bad RPC params, malformed event pattern)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The plugin asked for something its manifest does not declare
    #[error("Plugin '{plugin}' lacks capability for {action}")]
    CapabilityDenied { plugin: String, action: String },

    /// Duplicate RPC method registration
    #[error("Duplicate method: {0}")]
    DuplicateMethod(String),

    /// A route with the same method and path is already registered
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    /// The runtime handle was used after the plugin began shutting down
    #[error("Plugin '{0}' is shutting down")]
    ShuttingDown(String),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PluginError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
