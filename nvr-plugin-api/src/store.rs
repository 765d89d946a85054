//! Key-value persistence handle
//!
//! The host owns the concrete backend. Plugins only ever see a [`Store`]
//! that has already been confined to their own key prefix.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from a persistence backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend cannot be reached or is not configured
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// IO failure in a file-backed store
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded
    #[error("store serialization error: {0}")]
    Serialization(String),

    /// Key rejected by the backend (empty, or escaping a scoped prefix)
    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

/// Asynchronous key-value persistence.
///
/// Keys are `/`-separated strings. `list` returns every entry whose key
/// starts with `prefix`, sorted by key.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Write buffered mutations through to durable storage.
    ///
    /// Backends without buffering have nothing to do.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
