//! Plugin orchestration
//!
//! - [`ManifestRegistry`] holds validated manifests and the dependency graph
//! - [`PluginManager`] owns each plugin's record and drives its lifecycle
//! - [`RpcTable`] routes method calls to running plugins
//! - [`RouteTable`] holds the HTTP routes plugins mount
//! - [`HealthMonitor`] polls running plugins and folds their health together

/// Call the same `Plugin` method whatever role the instance fills
macro_rules! with_plugin {
    ($kind:expr, $p:ident => $body:expr) => {
        match $kind {
            nvr_plugin_api::PluginKind::Service($p) => $body,
            nvr_plugin_api::PluginKind::Camera($p) => $body,
            nvr_plugin_api::PluginKind::Notification($p) => $body,
        }
    };
}

mod error;
mod guard;
mod health;
mod loader;
mod manager;
mod record;
mod registry;
mod routes;
mod rpc;
mod state;

pub use error::{ErrorKind, ManagerError};
pub use health::{HealthMonitor, HealthSnapshot, CheckOutcome, SystemHealth, aggregate};
pub use loader::{LoadError, PluginFactory, PluginSource, find_library, load_library};
pub use manager::{DiscoveryReport, InstallOutcome, NotifyReport, PluginManager, StartAllReport};
pub use record::PluginStatus;
pub use registry::{
    MANIFEST_FILES, ManifestError, ManifestFormat, ManifestRegistry, find_manifest, load_manifest,
    parse_manifest, validate_manifest,
};
pub use routes::RouteTable;
pub use rpc::{RpcRequest, RpcTable};
pub use state::LifecycleState;
