//! Key-value persistence backends
//!
//! - [`MemoryStore`] keeps everything in process (tests, `in_memory = true`)
//! - [`JsonFileStore`] mirrors the map to a pretty-printed JSON file
//! - [`ScopedStore`] confines a plugin to its own key prefix

mod file;
mod memory;
mod scoped;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use scoped::ScopedStore;

pub use nvr_plugin_api::{Store, StoreError};

/// Key prefix under which plugin-private data lives
pub fn plugin_prefix(plugin_id: &str) -> String {
    format!("plugins/{plugin_id}/")
}

/// Key holding a plugin's persisted orchestration state
pub fn plugin_state_key(plugin_id: &str) -> String {
    format!("plugin-state/{plugin_id}")
}
