//! Shared fixtures for the plugin manager tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nvr_core::{ManagerConfig, MemoryStore, PluginManager, Store, StoreError};
use nvr_plugin_api::{
    Camera, CameraPlugin, Capability, HealthStatus, HttpMethod, Plugin, PluginConfig, PluginError,
    PluginKind, PluginManifest, PluginRuntime, PtzCommand, RouteResponse, ServicePlugin,
    route_handler, rpc_handler,
};
use serde_json::{Value, json};

/// Short timeouts so failure paths finish quickly
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        start_timeout: Duration::from_millis(200),
        stop_timeout: Duration::from_millis(200),
        rpc_timeout: Duration::from_millis(200),
        health_interval: Duration::from_millis(40),
        health_check_timeout: Duration::from_millis(40),
        subscriber_capacity: 16,
        ..ManagerConfig::default()
    }
}

pub fn manager() -> PluginManager {
    PluginManager::new(test_config(), Arc::new(MemoryStore::new()))
}

/// Ordered record of hook calls across every mock plugin
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
    pub handled_events: AtomicUsize,
    pub config_changes: AtomicUsize,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn handled(&self) -> usize {
        self.handled_events.load(Ordering::SeqCst)
    }
}

pub type StopHook = Arc<dyn Fn(&str) + Send + Sync>;

/// What a mock plugin does in each hook
#[derive(Clone, Default)]
pub struct Behavior {
    pub start_delay: Option<Duration>,
    pub stop_delay: Option<Duration>,
    pub fail_initialize: bool,
    pub fail_start: bool,
    pub panic_in_start: bool,
    pub panic_in_stop: bool,
    pub panic_in_health: bool,
    pub health_delay: Option<Duration>,
    pub health: Option<HealthStatus>,
    /// Report healthy through the runtime at the end of `start`
    pub healthy_on_start: bool,
    pub subscribe: Vec<&'static str>,
    pub on_stop: Option<StopHook>,
    /// Camera ids listed when installed through `camera_factory`
    pub cameras: Vec<&'static str>,
    pub panic_in_ptz: bool,
}

/// Builder for a compiled-in mock plugin
#[derive(Clone)]
pub struct MockSpec {
    pub manifest: PluginManifest,
    pub behavior: Behavior,
    pub journal: Arc<Journal>,
}

pub fn mock(id: &str, journal: &Arc<Journal>) -> MockSpec {
    MockSpec {
        manifest: PluginManifest::new(id, id, "1.0.0")
            .with_capability(Capability::Events)
            .with_capability(Capability::Rpc),
        behavior: Behavior::default(),
        journal: journal.clone(),
    }
}

impl MockSpec {
    pub fn depends_on(mut self, id: &str) -> Self {
        self.manifest = self.manifest.with_dependency(id);
        self
    }

    pub fn critical(mut self) -> Self {
        self.manifest = self.manifest.critical();
        self
    }

    pub fn capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.manifest.capabilities = capabilities;
        self
    }

    pub fn subscribe(mut self, patterns: &[&'static str]) -> Self {
        self.behavior.subscribe = patterns.to_vec();
        self
    }

    pub fn with(mut self, f: impl FnOnce(&mut Behavior)) -> Self {
        f(&mut self.behavior);
        self
    }

    pub fn factory(&self) -> impl Fn() -> PluginKind + Send + Sync + 'static {
        let spec = self.clone();
        move || {
            PluginKind::Service(Box::new(MockPlugin {
                spec: spec.clone(),
                runtime: None,
            }))
        }
    }

    /// Same plugin exposed as a camera integration
    pub fn camera_factory(&self) -> impl Fn() -> PluginKind + Send + Sync + 'static {
        let spec = self.clone();
        move || {
            PluginKind::Camera(Box::new(MockPlugin {
                spec: spec.clone(),
                runtime: None,
            }))
        }
    }

    pub async fn install(&self, manager: &PluginManager) -> nvr_core::plugins::InstallOutcome {
        manager.register_builtin(self.factory()).await.unwrap()
    }

    pub async fn install_camera(
        &self,
        manager: &PluginManager,
    ) -> nvr_core::plugins::InstallOutcome {
        manager.register_builtin(self.camera_factory()).await.unwrap()
    }
}

pub struct MockPlugin {
    spec: MockSpec,
    runtime: Option<PluginRuntime>,
}

impl MockPlugin {
    fn id(&self) -> &str {
        &self.spec.manifest.id
    }

    fn record(&self, hook: &str) {
        self.spec.journal.push(format!("{}:{hook}", self.id()));
    }
}

fn explode() -> Result<Value, PluginError> {
    panic!("handler exploded")
}

#[async_trait]
impl Plugin for MockPlugin {
    fn manifest(&self) -> PluginManifest {
        self.spec.manifest.clone()
    }

    async fn initialize(&mut self, runtime: PluginRuntime) -> Result<(), PluginError> {
        self.record("initialize");
        self.runtime = Some(runtime);
        if self.spec.behavior.fail_initialize {
            return Err(PluginError::config("bad settings"));
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        let behavior = self.spec.behavior.clone();
        if let Some(delay) = behavior.start_delay {
            tokio::time::sleep(delay).await;
        }
        if behavior.panic_in_start {
            panic!("start exploded");
        }
        if behavior.fail_start {
            return Err(PluginError::custom("camera unreachable"));
        }

        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| PluginError::custom("not initialized"))?;
        if !behavior.subscribe.is_empty() {
            let journal = self.spec.journal.clone();
            runtime.on_event(&behavior.subscribe, move |_| {
                journal.handled_events.fetch_add(1, Ordering::SeqCst);
            })?;
        }
        if runtime.has_capability(&Capability::Rpc) {
            runtime.register_method(
                "ping",
                rpc_handler(|params: Value| async move { Ok(json!({ "pong": params })) }),
            )?;
            runtime.register_method(
                "explode",
                rpc_handler(|_| async move { explode() }),
            )?;
            runtime.register_method(
                "slow",
                rpc_handler(|_| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Null)
                }),
            )?;
            runtime.register_method(
                "refuse",
                rpc_handler(|_| async move { Err(PluginError::invalid_input("limit too large")) }),
            )?;
        }
        if runtime.has_capability(&Capability::HttpRoutes) {
            runtime.register_route(
                HttpMethod::Get,
                "/zones/:zone",
                route_handler(|request| async move {
                    let zone = request.params.get("zone").cloned().unwrap_or_default();
                    RouteResponse::json(200, &json!({ "zone": zone }))
                }),
            )?;
            runtime.register_route(
                HttpMethod::Get,
                "/explode",
                route_handler(|_| async move {
                    explode()?;
                    Ok(RouteResponse::empty(204))
                }),
            )?;
            runtime.register_route(
                HttpMethod::Post,
                "/slow",
                route_handler(|_| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(RouteResponse::empty(204))
                }),
            )?;
        }
        if behavior.healthy_on_start {
            runtime.set_healthy("warmed up");
        }
        self.record("start");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        if let Some(hook) = &self.spec.behavior.on_stop {
            hook(&self.spec.manifest.id);
        }
        if let Some(delay) = self.spec.behavior.stop_delay {
            tokio::time::sleep(delay).await;
        }
        if self.spec.behavior.panic_in_stop {
            panic!("stop exploded");
        }
        self.record("stop");
        Ok(())
    }

    async fn health_check(&self) -> Option<HealthStatus> {
        if self.spec.behavior.panic_in_health {
            panic!("health check exploded");
        }
        if let Some(delay) = self.spec.behavior.health_delay {
            tokio::time::sleep(delay).await;
        }
        self.spec.behavior.health.clone()
    }
}

#[async_trait]
impl ServicePlugin for MockPlugin {
    async fn on_config_change(&mut self, _config: &PluginConfig) -> Result<(), PluginError> {
        self.spec
            .journal
            .config_changes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CameraPlugin for MockPlugin {
    async fn discover_cameras(&mut self) -> Result<Vec<Camera>, PluginError> {
        self.record("discover");
        Ok(self.cameras())
    }

    fn cameras(&self) -> Vec<Camera> {
        self.spec
            .behavior
            .cameras
            .iter()
            .map(|id| Camera {
                id: id.to_string(),
                name: id.to_string(),
                model: None,
                stream_url: None,
                online: true,
                has_ptz: self.spec.manifest.has_capability(&Capability::Ptz),
            })
            .collect()
    }

    async fn ptz(&self, camera_id: &str, command: &PtzCommand) -> Result<(), PluginError> {
        if self.spec.behavior.panic_in_ptz {
            panic!("ptz exploded");
        }
        if command.zoom > 1.0 {
            return Err(PluginError::invalid_input("zoom out of range"));
        }
        self.record(&format!("ptz:{camera_id}:{:?}", command.action));
        Ok(())
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn put(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk offline".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unavailable("disk offline".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("disk offline".into()))
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Err(StoreError::Unavailable("disk offline".into()))
    }
}

/// Poll `cond` until it holds or a second passes
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
