//! PluginRuntime - a plugin's capability-scoped handle to the host
//!
//! Every handle a plugin receives is built by the host for that plugin
//! alone: the store is already confined to the plugin's key prefix, bus
//! access is checked against the manifest's capabilities, and everything
//! stops working once the host cancels the plugin's shutdown token.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::{self, Capability};
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::event::{Event, EventPattern, PublishReport};
use crate::health::HealthReporter;
use crate::http::{HttpMethod, RouteHandler, RouteRegistrar};
use crate::logs::{LogBuffer, LogLevel};
use crate::store::Store;

/// Future returned by an RPC handler.
pub type RpcFuture = BoxFuture<'static, Result<Value, PluginError>>;

/// A plugin-defined RPC method: JSON params in, JSON result out.
pub type RpcHandler = Arc<dyn Fn(Value) -> RpcFuture + Send + Sync>;

/// Wrap an async closure as an [`RpcHandler`].
///
/// ```ignore
/// runtime.register_method("recent", rpc_handler(move |params| {
///     let archive = archive.clone();
///     async move { archive.recent(params).await }
/// }))?;
/// ```
pub fn rpc_handler<F, Fut>(f: F) -> RpcHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, PluginError>> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// Host side of event publish/subscribe, as seen through a runtime.
pub trait EventBroker: Send + Sync {
    fn publish(&self, event: Event) -> PublishReport;

    /// Register `plugin_id` for `patterns` with a bounded delivery queue.
    fn subscribe(
        &self,
        plugin_id: &str,
        patterns: Vec<EventPattern>,
        capacity: usize,
    ) -> mpsc::Receiver<Arc<Event>>;
}

/// Host side of RPC method registration.
pub trait MethodRegistry: Send + Sync {
    fn register(&self, plugin_id: &str, method: &str, handler: RpcHandler)
    -> Result<(), PluginError>;
}

/// Everything the host wires into a [`PluginRuntime`].
pub struct RuntimeParts {
    pub plugin_id: String,
    pub capabilities: Vec<Capability>,
    pub config: PluginConfig,
    pub install_path: Option<PathBuf>,
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn EventBroker>,
    pub methods: Arc<dyn MethodRegistry>,
    pub routes: Arc<dyn RouteRegistrar>,
    pub health: HealthReporter,
    pub logs: LogBuffer,
    pub shutdown: CancellationToken,
    pub subscriber_capacity: usize,
}

/// Capability-scoped handle passed to [`crate::Plugin::initialize`].
///
/// Cheap to clone; clones share the same scope and shutdown token.
#[derive(Clone)]
pub struct PluginRuntime {
    inner: Arc<RuntimeParts>,
}

/// Queue of events delivered to one subscription.
///
/// Yields `None` once the subscription is removed or the plugin is shutting
/// down.
pub struct EventReceiver {
    rx: mpsc::Receiver<Arc<Event>>,
    shutdown: CancellationToken,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Take the events that were delivered but not yet received.
    ///
    /// Works after shutdown so a plugin can finish what it was handed.
    pub fn drain(&mut self) -> Vec<Arc<Event>> {
        let mut pending = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            pending.push(event);
        }
        pending
    }
}

impl PluginRuntime {
    pub fn new(parts: RuntimeParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    // ─── Identity & Configuration ────────────────────────────────────

    pub fn plugin_id(&self) -> &str {
        &self.inner.plugin_id
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.inner.capabilities
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.inner.capabilities.contains(capability)
    }

    /// Directory the plugin was installed from, if it came from disk
    pub fn install_path(&self) -> Option<&Path> {
        self.inner.install_path.as_deref()
    }

    pub fn config(&self) -> &PluginConfig {
        &self.inner.config
    }

    /// Read a configuration value
    ///
    /// # Example
    /// ```ignore
    /// let threshold: Option<f64> = runtime.config_get("threshold");
    /// ```
    pub fn config_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inner.config.get(key)
    }

    pub fn config_str(&self, key: &str, default: &str) -> String {
        self.inner.config.get_str(key, default)
    }

    pub fn config_int(&self, key: &str, default: i64) -> i64 {
        self.inner.config.get_i64(key, default)
    }

    pub fn config_float(&self, key: &str, default: f64) -> f64 {
        self.inner.config.get_f64(key, default)
    }

    pub fn config_bool(&self, key: &str, default: bool) -> bool {
        self.inner.config.get_bool(key, default)
    }

    /// Persistence handle scoped to this plugin's keys
    pub fn store(&self) -> Arc<dyn Store> {
        self.inner.store.clone()
    }

    // ─── Events ──────────────────────────────────────────────────────

    /// Publish an event on behalf of this plugin.
    ///
    /// The event type must fall in a namespace the plugin declared.
    /// Never blocks; slow subscribers lose the event instead.
    pub fn publish(&self, event: Event) -> Result<PublishReport, PluginError> {
        self.ensure_active()?;
        let pattern = EventPattern::Exact(event.event_type.clone());
        if !capability::permits(&self.inner.capabilities, &pattern) {
            return Err(self.denied(format!("publish '{}'", event.event_type)));
        }
        let event = event.from_plugin(self.inner.plugin_id.clone());
        Ok(self.inner.broker.publish(event))
    }

    /// Subscribe to one or more event patterns (`detection`, `camera.*`, `*`).
    pub fn subscribe(&self, patterns: &[&str]) -> Result<EventReceiver, PluginError> {
        self.ensure_active()?;
        if patterns.is_empty() {
            return Err(PluginError::invalid_input("no event patterns given"));
        }
        let mut parsed = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let pattern = EventPattern::parse(raw)?;
            if !capability::permits(&self.inner.capabilities, &pattern) {
                return Err(self.denied(format!("subscribe to '{pattern}'")));
            }
            parsed.push(pattern);
        }
        let rx = self.inner.broker.subscribe(
            &self.inner.plugin_id,
            parsed,
            self.inner.subscriber_capacity,
        );
        Ok(EventReceiver {
            rx,
            shutdown: self.inner.shutdown.clone(),
        })
    }

    /// Subscribe and run `handler` for every delivered event on a task.
    ///
    /// A panicking handler is logged and marks the plugin unhealthy; delivery
    /// continues with the next event.
    pub fn on_event<F>(&self, patterns: &[&str], handler: F) -> Result<JoinHandle<()>, PluginError>
    where
        F: Fn(Arc<Event>) + Send + Sync + 'static,
    {
        let mut rx = self.subscribe(patterns)?;
        let runtime = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event.clone())));
                if result.is_err() {
                    tracing::error!(
                        plugin = %runtime.plugin_id(),
                        event_type = %event.event_type,
                        "Plugin event handler panicked"
                    );
                    runtime.set_unhealthy("event handler panicked");
                }
            }
        }))
    }

    // ─── RPC ─────────────────────────────────────────────────────────

    /// Expose an RPC method. Requires the `rpc` capability.
    pub fn register_method(&self, method: &str, handler: RpcHandler) -> Result<(), PluginError> {
        self.ensure_active()?;
        if !self.has_capability(&Capability::Rpc) {
            return Err(self.denied(format!("register method '{method}'")));
        }
        if method.trim().is_empty() {
            return Err(PluginError::invalid_input("empty method name"));
        }
        self.inner
            .methods
            .register(&self.inner.plugin_id, method, handler)
    }

    // ─── HTTP routes ─────────────────────────────────────────────────

    /// Mount an HTTP route under the plugin's prefix. Requires the
    /// `http_routes` capability.
    ///
    /// `path` starts with `/` and may contain `:param` segments.
    pub fn register_route(
        &self,
        method: HttpMethod,
        path: &str,
        handler: RouteHandler,
    ) -> Result<(), PluginError> {
        self.ensure_active()?;
        if !self.has_capability(&Capability::HttpRoutes) {
            return Err(self.denied(format!("route {method} {path}")));
        }
        if !path.starts_with('/') {
            return Err(PluginError::invalid_input(format!(
                "route path '{path}' must start with '/'"
            )));
        }
        self.inner
            .routes
            .register_route(&self.inner.plugin_id, method, path, handler)
    }

    // ─── Health ──────────────────────────────────────────────────────

    pub fn health(&self) -> &HealthReporter {
        &self.inner.health
    }

    pub fn set_healthy(&self, message: impl Into<String>) {
        self.inner.health.set_healthy(message);
    }

    pub fn set_degraded(&self, message: impl Into<String>) {
        self.inner.health.set_degraded(message);
    }

    pub fn set_unhealthy(&self, message: impl Into<String>) {
        self.inner.health.set_unhealthy(message);
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message (tagged with the plugin id and captured)
    pub fn log_info(&self, message: &str) {
        tracing::info!(plugin = %self.inner.plugin_id, "{}", message);
        self.inner.logs.push(LogLevel::Info, message);
    }

    pub fn log_warn(&self, message: &str) {
        tracing::warn!(plugin = %self.inner.plugin_id, "{}", message);
        self.inner.logs.push(LogLevel::Warn, message);
    }

    pub fn log_error(&self, message: &str) {
        tracing::error!(plugin = %self.inner.plugin_id, "{}", message);
        self.inner.logs.push(LogLevel::Error, message);
    }

    pub fn log_debug(&self, message: &str) {
        tracing::debug!(plugin = %self.inner.plugin_id, "{}", message);
        self.inner.logs.push(LogLevel::Debug, message);
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.inner.logs
    }

    // ─── Shutdown ────────────────────────────────────────────────────

    /// Token cancelled when the host begins stopping this plugin.
    ///
    /// Background tasks should select on it and exit.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn ensure_active(&self) -> Result<(), PluginError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PluginError::ShuttingDown(self.inner.plugin_id.clone()));
        }
        Ok(())
    }

    fn denied(&self, action: String) -> PluginError {
        PluginError::CapabilityDenied {
            plugin: self.inner.plugin_id.clone(),
            action,
        }
    }
}
