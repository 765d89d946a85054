//! nvr-core: plugin orchestration and event distribution for the nvr daemon
//!
//! - **Plugins** - [`PluginManager`] installs, starts, stops and supervises
//!   plugins in dependency order and routes RPC calls to them
//! - **Events** - [`EventBus`] for in-process pub/sub, [`StreamFanout`] for
//!   live API clients
//! - **Storage** - [`Store`] backends for persisted plugin state
//! - **Config** - [`NvrConfig`] loaded from TOML

pub mod config;
pub mod error;
pub mod events;
pub mod plugins;
pub mod store;

pub use config::{ConfigError, ManagerConfig, NvrConfig};
pub use error::{NvrError, Result};
pub use events::{ClientFilter, EventBus, FanoutClient, StreamFanout};
pub use plugins::{
    ErrorKind, LifecycleState, ManagerError, ManifestRegistry, PluginManager, PluginSource,
    PluginStatus, SystemHealth,
};
pub use store::{JsonFileStore, MemoryStore, ScopedStore, Store, StoreError};

/// Open the store configured in `config`
pub async fn open_store(config: &NvrConfig) -> Result<std::sync::Arc<dyn Store>> {
    if config.storage.in_memory {
        return Ok(std::sync::Arc::new(MemoryStore::new()));
    }
    let store = JsonFileStore::load(&config.storage.path).await?;
    Ok(std::sync::Arc::new(store))
}
