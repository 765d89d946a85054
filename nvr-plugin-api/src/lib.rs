//! nvr-plugin-api - Plugin API for the nvr video recording daemon
//!
//! This crate provides the traits and types needed to write nvr plugins:
//! camera integrations, detection backends, notification channels and
//! background services. Plugins are either compiled into the daemon or
//! shipped as dynamic libraries next to a `manifest.yaml`.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use nvr_plugin_api::{
//!     Plugin, PluginError, PluginManifest, PluginRuntime, ServicePlugin, export_plugin,
//! };
//!
//! #[derive(Default)]
//! pub struct MotionLogger {
//!     runtime: Option<PluginRuntime>,
//! }
//!
//! #[async_trait]
//! impl Plugin for MotionLogger {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest::new("motion-logger", "Motion Logger", "0.1.0")
//!     }
//!
//!     async fn initialize(&mut self, runtime: PluginRuntime) -> Result<(), PluginError> {
//!         self.runtime = Some(runtime);
//!         Ok(())
//!     }
//!
//!     async fn start(&mut self) -> Result<(), PluginError> {
//!         let runtime = self.runtime.clone().ok_or_else(|| PluginError::custom("not initialized"))?;
//!         let logger = runtime.clone();
//!         runtime.on_event(&["motion"], move |event| {
//!             logger.log_info(&format!("motion on {:?}", event.camera_id));
//!         })?;
//!         Ok(())
//!     }
//!
//!     async fn stop(&mut self) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl ServicePlugin for MotionLogger {}
//!
//! export_plugin!(Service, MotionLogger);
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod http;
pub mod logs;
pub mod runtime;
pub mod store;
pub mod types;

use async_trait::async_trait;

pub use capability::Capability;
pub use config::PluginConfig;
pub use error::PluginError;
pub use event::{Event, EventPattern, PublishReport};
pub use health::{HealthReporter, HealthState, HealthStatus};
pub use http::{
    HttpMethod, RouteFuture, RouteHandler, RouteRegistrar, RouteRequest, RouteResponse,
    route_handler,
};
pub use logs::{LogBuffer, LogEntry, LogLevel};
pub use runtime::{
    EventBroker, EventReceiver, MethodRegistry, PluginRuntime, RpcFuture, RpcHandler,
    RuntimeParts, rpc_handler,
};
pub use store::{Store, StoreError};
pub use types::*;

/// Current plugin API version. Plugins must match this exactly.
/// This is checked when loading plugins to ensure compatibility.
pub const API_VERSION: u32 = 1;

/// The core plugin trait.
///
/// The host calls `initialize` then `start` when bringing the plugin up and
/// `stop` when taking it down, each under a deadline. By the time `stop`
/// runs the plugin's subscriptions and RPC methods are already gone.
/// A plugin may be started again after it was stopped.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Return plugin metadata
    fn manifest(&self) -> PluginManifest;

    /// Receive the runtime handle. Keep a clone for later use.
    async fn initialize(&mut self, runtime: PluginRuntime) -> Result<(), PluginError>;

    /// Begin work: subscribe to events, register RPC methods, spawn tasks.
    async fn start(&mut self) -> Result<(), PluginError>;

    /// Release resources. Tasks should already be winding down through the
    /// runtime's shutdown token.
    async fn stop(&mut self) -> Result<(), PluginError>;

    /// Active health check, polled by the host while running.
    ///
    /// `None` means "nothing to add"; the host then keeps whatever the
    /// plugin last reported through its runtime.
    async fn health_check(&self) -> Option<HealthStatus> {
        None
    }
}

/// A background service (detection pipeline, archive, analytics).
#[async_trait]
pub trait ServicePlugin: Plugin {
    /// Called when the plugin's configuration changes while it runs.
    async fn on_config_change(&mut self, _config: &PluginConfig) -> Result<(), PluginError> {
        Ok(())
    }
}

/// A camera integration (ONVIF, RTSP, vendor SDK).
#[async_trait]
pub trait CameraPlugin: Plugin {
    /// Query the network or vendor API for cameras.
    async fn discover_cameras(&mut self) -> Result<Vec<Camera>, PluginError>;

    /// Cameras this plugin currently manages.
    fn cameras(&self) -> Vec<Camera>;

    /// Move, zoom or recall a preset on one of this plugin's cameras.
    ///
    /// Only called for plugins declaring the `ptz` capability.
    async fn ptz(&self, camera_id: &str, _command: &PtzCommand) -> Result<(), PluginError> {
        Err(PluginError::custom(format!(
            "camera '{camera_id}' does not support PTZ"
        )))
    }
}

/// A notification channel (push, email, webhook).
#[async_trait]
pub trait NotificationPlugin: Plugin {
    async fn notify(&self, notification: &Notification) -> Result<(), PluginError>;
}

/// A plugin instance tagged with the role it fills.
pub enum PluginKind {
    Service(Box<dyn ServicePlugin>),
    Camera(Box<dyn CameraPlugin>),
    Notification(Box<dyn NotificationPlugin>),
}

impl PluginKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Service(_) => "service",
            Self::Camera(_) => "camera",
            Self::Notification(_) => "notification",
        }
    }

    pub fn manifest(&self) -> PluginManifest {
        match self {
            Self::Service(p) => p.manifest(),
            Self::Camera(p) => p.manifest(),
            Self::Notification(p) => p.manifest(),
        }
    }
}

/// Export a plugin type for dynamic loading.
///
/// The first argument names the [`PluginKind`] variant the plugin fills.
///
/// # Usage
///
/// ```ignore
/// nvr_plugin_api::export_plugin!(Camera, OnvifPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_nvr_plugin_create()`: Creates a new boxed `PluginKind`
/// - `_nvr_plugin_api_version()`: Returns the API version
#[macro_export]
macro_rules! export_plugin {
    ($kind:ident, $plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _nvr_plugin_create() -> *mut $crate::PluginKind {
            let plugin = $crate::PluginKind::$kind(Box::new(<$plugin_type>::default()));
            Box::into_raw(Box::new(plugin))
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _nvr_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }
    };
}
