//! RPC method table

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use nvr_plugin_api::{MethodRegistry, PluginError, RpcHandler};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An RPC call addressed to a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Handlers registered by running plugins, keyed by plugin then method
#[derive(Default)]
pub struct RpcTable {
    handlers: RwLock<HashMap<String, HashMap<String, RpcHandler>>>,
}

impl RpcTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        plugin_id: &str,
        method: &str,
        handler: RpcHandler,
    ) -> Result<(), PluginError> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let methods = handlers.entry(plugin_id.to_string()).or_default();
        if methods.contains_key(method) {
            return Err(PluginError::DuplicateMethod(format!("{plugin_id}.{method}")));
        }
        methods.insert(method.to_string(), handler);
        tracing::debug!(plugin = %plugin_id, method = %method, "Registered RPC method");
        Ok(())
    }

    /// Drop every handler of a plugin. Returns how many were removed.
    pub fn unregister_plugin(&self, plugin_id: &str) -> usize {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(plugin_id)
            .map(|methods| methods.len())
            .unwrap_or(0)
    }

    pub fn get(&self, plugin_id: &str, method: &str) -> Option<RpcHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin_id)
            .and_then(|methods| methods.get(method))
            .cloned()
    }

    /// Method names of a plugin, sorted
    pub fn methods(&self, plugin_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin_id)
            .map(|methods| methods.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl MethodRegistry for RpcTable {
    fn register(
        &self,
        plugin_id: &str,
        method: &str,
        handler: RpcHandler,
    ) -> Result<(), PluginError> {
        RpcTable::register(self, plugin_id, method, handler)
    }
}
