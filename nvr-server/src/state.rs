//! Shared application state for the nvr server

use chrono::{DateTime, Utc};
use nvr_core::PluginManager;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: PluginManager,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(manager: PluginManager) -> Self {
        Self {
            manager,
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
