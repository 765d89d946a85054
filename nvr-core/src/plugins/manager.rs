//! PluginManager - owns plugin records and drives their lifecycles

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, join_all};
use nvr_plugin_api::event::types;
use nvr_plugin_api::{
    Camera, Capability, Event, HealthState, HealthStatus, HttpMethod, LogEntry, LogLevel,
    Notification, PluginConfig, PluginError, PluginKind, PluginManifest, PluginRuntime, PtzCommand,
    PublishReport, RouteRequest, RouteResponse, RuntimeParts, Store,
};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::{ErrorKind, ManagerError};
use super::guard::{Guarded, guarded};
use super::health::{HealthMonitor, HealthSnapshot, CheckOutcome, SystemHealth};
use super::loader::PluginSource;
use super::record::{Lifecycle, PersistedState, PluginRecord, PluginSlot, PluginStatus};
use super::registry::{ManifestRegistry, find_manifest, load_manifest, validate_manifest};
use super::routes::RouteTable;
use super::rpc::RpcTable;
use super::state::LifecycleState;
use crate::config::ManagerConfig;
use crate::events::{EventBus, StreamFanout};
use crate::store::{ScopedStore, plugin_prefix, plugin_state_key};

/// Result of installing one plugin.
///
/// Missing dependencies and cycles do not fail the install; they are
/// reported here and the plugin stays `Installed` until resolved.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub id: String,
    pub issues: Vec<ManagerError>,
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub installed: Vec<InstallOutcome>,
    pub failed: Vec<(PathBuf, ManagerError)>,
}

#[derive(Debug, Default)]
pub struct StartAllReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, ManagerError)>,
    /// Disabled plugins and plugins whose dependencies can never be met
    pub skipped: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct NotifyReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

enum Hook {
    Initialize(PluginRuntime),
    Start,
    Stop,
}

impl Hook {
    fn phase(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

async fn run_hook(
    instance: &mut PluginKind,
    hook: Hook,
    deadline: Duration,
    cancel: Option<&CancellationToken>,
) -> Guarded<Result<(), PluginError>> {
    let call: BoxFuture<'_, Result<(), PluginError>> = match hook {
        Hook::Initialize(runtime) => with_plugin!(instance, p => p.initialize(runtime)),
        Hook::Start => with_plugin!(instance, p => p.start()),
        Hook::Stop => with_plugin!(instance, p => p.stop()),
    };
    guarded(call, deadline, cancel).await
}

enum Step {
    Done,
    Failed(ManagerError),
    Cancelled,
}

fn start_step(
    id: &str,
    phase: &'static str,
    outcome: Guarded<Result<(), PluginError>>,
    timeout: Duration,
) -> Step {
    match outcome {
        Guarded::Completed(Ok(())) => Step::Done,
        Guarded::Completed(Err(e)) => Step::Failed(ManagerError::PluginFailed {
            id: id.to_string(),
            phase,
            message: e.to_string(),
        }),
        Guarded::TimedOut => Step::Failed(ManagerError::StartTimeout {
            id: id.to_string(),
            phase,
            timeout,
        }),
        Guarded::Panicked(message) => Step::Failed(ManagerError::PluginFault {
            id: id.to_string(),
            phase,
            message,
        }),
        Guarded::Cancelled => Step::Cancelled,
    }
}

struct ManagerInner {
    config: ManagerConfig,
    /// Lock order: `registry` before `slots`
    registry: RwLock<ManifestRegistry>,
    slots: RwLock<BTreeMap<String, Arc<PluginSlot>>>,
    bus: Arc<EventBus>,
    fanout: StreamFanout,
    rpc: Arc<RpcTable>,
    routes: Arc<RouteTable>,
    store: Arc<dyn Store>,
    monitor: HealthMonitor,
    shutdown: CancellationToken,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Top-level plugin orchestrator.
///
/// Cheap to clone; clones share the same plugins, bus and fanout.
/// Lifecycle operations on one plugin are serialized; different plugins
/// proceed independently except where dependencies force an order.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

impl PluginManager {
    /// Create a manager and attach the stream fanout to its bus.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ManagerConfig, store: Arc<dyn Store>) -> Self {
        let bus = Arc::new(EventBus::new());
        let fanout = StreamFanout::new(config.client_capacity);
        let shutdown = CancellationToken::new();
        fanout.attach(&bus, config.fanout_capacity, shutdown.child_token());
        let monitor = HealthMonitor::new(config.health_interval, config.health_check_timeout);

        Self {
            inner: Arc::new(ManagerInner {
                config,
                registry: RwLock::new(ManifestRegistry::new()),
                slots: RwLock::new(BTreeMap::new()),
                bus,
                fanout,
                rpc: Arc::new(RpcTable::new()),
                routes: Arc::new(RouteTable::new()),
                store,
                monitor,
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.inner.bus.clone()
    }

    pub fn fanout(&self) -> &StreamFanout {
        &self.inner.fanout
    }

    // ─── Install ─────────────────────────────────────────────────────

    /// Register a plugin from its manifest and code source
    pub async fn install(
        &self,
        manifest: PluginManifest,
        source: PluginSource,
        install_path: Option<PathBuf>,
    ) -> Result<InstallOutcome, ManagerError> {
        validate_manifest(&manifest)?;
        let id = manifest.id.clone();
        if self.find_slot(&id).is_some() {
            return Err(ManagerError::DuplicateId { id });
        }

        let persisted = self.load_persisted(&id).await;
        let base_config = self.base_config(&id, install_path.as_deref());
        let (enabled, override_config) = match persisted {
            Some(state) => (state.enabled, PluginConfig::from_map(state.config)),
            None => (self.inner.config.enabled_by_default, PluginConfig::new()),
        };

        let issues = {
            let mut registry = self.write_registry();
            let manifest = registry.register(manifest)?;
            let record = PluginRecord {
                manifest,
                state: LifecycleState::Installed,
                enabled,
                install_path: install_path.clone(),
                base_config,
                override_config,
                error_message: None,
                dependency_issue: false,
                installed_at: Utc::now(),
                last_started_at: None,
                last_stopped_at: None,
            };
            let slot = Arc::new(PluginSlot::new(
                record,
                source,
                self.inner.config.log_capacity,
            ));
            self.write_slots().insert(id.clone(), slot);

            let mut issues = Vec::new();
            let missing = registry.missing_dependencies(&id);
            if !missing.is_empty() {
                issues.push(ManagerError::DependencyMissing {
                    id: id.clone(),
                    missing,
                });
            }
            if let Some(members) = registry.cycle_containing(&id) {
                issues.push(ManagerError::DependencyCycle {
                    id: id.clone(),
                    members,
                });
            }
            issues
        };

        for issue in &issues {
            tracing::warn!(plugin = %id, kind = %issue.kind(), error = %issue, "Plugin installed with unresolved dependencies");
            let affected = match issue {
                ManagerError::DependencyCycle { members, .. } => members.clone(),
                _ => vec![id.clone()],
            };
            for member in affected {
                if let Some(slot) = self.find_slot(&member) {
                    slot.update(|r| {
                        r.error_message = Some(issue.to_string());
                        r.dependency_issue = true;
                    });
                }
            }
        }
        self.clear_resolved_issues(&id);

        tracing::info!(
            plugin = %id,
            enabled,
            path = ?install_path,
            "Plugin installed"
        );
        Ok(InstallOutcome { id, issues })
    }

    /// Clear install-time dependency errors of plugins that `id` completed
    fn clear_resolved_issues(&self, id: &str) {
        let resolved: Vec<String> = {
            let registry = self.read_registry();
            registry
                .dependents(id)
                .into_iter()
                .filter(|d| {
                    registry.missing_dependencies(d).is_empty()
                        && registry.cycle_containing(d).is_none()
                })
                .collect()
        };
        for dependent in resolved {
            let Some(slot) = self.find_slot(&dependent) else {
                continue;
            };
            let cleared = slot.update(|r| {
                let had_issue = r.dependency_issue;
                if had_issue {
                    r.error_message = None;
                    r.dependency_issue = false;
                }
                had_issue
            });
            if cleared {
                tracing::info!(plugin = %dependent, dependency = %id, "Dependencies resolved");
            }
        }
    }

    /// Install a compiled-in plugin
    pub async fn register_builtin<F>(&self, factory: F) -> Result<InstallOutcome, ManagerError>
    where
        F: Fn() -> PluginKind + Send + Sync + 'static,
    {
        let instance = factory();
        let manifest = instance.manifest();
        let id = manifest.id.clone();
        let outcome = self
            .install(manifest, PluginSource::builtin(factory), None)
            .await?;
        if let Some(slot) = self.find_slot(&id) {
            slot.lifecycle.lock().await.instance = Some(instance);
        }
        Ok(outcome)
    }

    /// Install the plugin whose manifest and library live in `dir`
    pub async fn install_from_dir(&self, dir: &Path) -> Result<InstallOutcome, ManagerError> {
        let manifest = load_manifest(&find_manifest(dir)?)?;
        self.install(
            manifest,
            PluginSource::Library {
                dir: dir.to_path_buf(),
            },
            Some(dir.to_path_buf()),
        )
        .await
    }

    /// Install every plugin directory under `plugins_dir`
    pub async fn discover(&self, plugins_dir: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let entries = match std::fs::read_dir(plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %plugins_dir.display(), error = %e, "Plugin directory not readable");
                return report;
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            match self.install_from_dir(&dir).await {
                Ok(outcome) => report.installed.push(outcome),
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "Failed to install plugin");
                    report.failed.push((dir, e));
                }
            }
        }
        report
    }

    // ─── Start ───────────────────────────────────────────────────────

    /// Start a plugin and, first, everything it depends on.
    ///
    /// Starting a running plugin is a no-op.
    pub async fn start(&self, id: &str) -> Result<(), ManagerError> {
        self.start_inner(id).await
    }

    fn start_inner<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ManagerError>> {
        Box::pin(async move {
            let slot = self.slot(id)?;
            let epoch = slot.stop_epoch();
            if slot.state() == LifecycleState::Running {
                tracing::debug!(plugin = %id, "Plugin already running");
                return Ok(());
            }
            if !slot.enabled() {
                return Err(ManagerError::PluginDisabled { id: id.to_string() });
            }
            if let Err(e) = self.check_resolvable(id) {
                slot.update(|r| {
                    r.error_message = Some(e.to_string());
                    r.dependency_issue = true;
                });
                return Err(e);
            }

            let manifest = slot.manifest();
            for dependency in &manifest.dependencies {
                if let Err(e) = self.start_inner(dependency).await {
                    let err = ManagerError::DependencyUnavailable {
                        id: id.to_string(),
                        dependency: dependency.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(plugin = %id, dependency = %dependency, error = %e, "Dependency unavailable");
                    slot.update(|r| r.error_message = Some(err.to_string()));
                    return Err(err);
                }
                if slot.stop_epoch() != epoch {
                    tracing::info!(plugin = %id, "Start cancelled while starting dependencies");
                    return Err(ManagerError::Cancelled { id: id.to_string() });
                }
            }

            let mut life = slot.lifecycle.lock().await;
            self.start_locked(&slot, &mut life, epoch).await
        })
    }

    async fn start_locked(
        &self,
        slot: &Arc<PluginSlot>,
        life: &mut Lifecycle,
        epoch: u64,
    ) -> Result<(), ManagerError> {
        let id = slot.id.as_str();
        let record = slot.record();
        match record.state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Uninstalled => return Err(ManagerError::not_found(id)),
            state if !state.can_start() => {
                return Err(ManagerError::InvalidState {
                    id: id.to_string(),
                    state,
                    action: "start",
                });
            }
            _ => {}
        }
        if !record.enabled {
            return Err(ManagerError::PluginDisabled { id: id.to_string() });
        }
        // a stop was requested while we waited for the lock
        if slot.stop_epoch() != epoch {
            return Err(ManagerError::Cancelled { id: id.to_string() });
        }
        // a dependency may have stopped while we waited for the lock
        for dependency in &record.manifest.dependencies {
            let state = self.find_slot(dependency).map(|s| s.state());
            if state != Some(LifecycleState::Running) {
                return Err(ManagerError::DependencyUnavailable {
                    id: id.to_string(),
                    dependency: dependency.clone(),
                    reason: match state {
                        Some(state) => format!("not running ({state})"),
                        None => "not installed".to_string(),
                    },
                });
            }
        }

        let cancel = CancellationToken::new();
        slot.set_pending_start(Some(cancel.clone()));
        let result = self.bring_up(slot, life, &record, &cancel).await;
        slot.set_pending_start(None);
        result
    }

    async fn bring_up(
        &self,
        slot: &Arc<PluginSlot>,
        life: &mut Lifecycle,
        record: &PluginRecord,
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let id = slot.id.as_str();
        slot.transition(LifecycleState::Initializing)?;
        slot.update(|r| {
            r.error_message = None;
            r.dependency_issue = false;
        });
        slot.health.reset();
        tracing::info!(plugin = %id, version = %record.manifest.version, "Starting plugin");

        if life.instance.is_none() {
            match slot.source.instantiate(id) {
                Ok((instance, library)) => {
                    let reported = instance.manifest().id;
                    if reported != id {
                        drop(instance);
                        drop(library);
                        let err = ManagerError::LoadFailed {
                            id: id.to_string(),
                            message: format!("library reports plugin id '{reported}'"),
                        };
                        return Err(self.fail_start(slot, life, err, None));
                    }
                    life.instance = Some(instance);
                    if library.is_some() {
                        life.library = library;
                    }
                }
                Err(e) => {
                    let err = ManagerError::LoadFailed {
                        id: id.to_string(),
                        message: e.to_string(),
                    };
                    return Err(self.fail_start(slot, life, err, None));
                }
            }
        }

        let run_token = self.inner.shutdown.child_token();
        let runtime = self.runtime_for(slot, record, run_token.clone());
        let timeout = self.inner.config.start_timeout;

        for hook in [Hook::Initialize(runtime), Hook::Start] {
            let phase = hook.phase();
            let outcome = match life.instance.as_mut() {
                Some(instance) => run_hook(instance, hook, timeout, Some(cancel)).await,
                None => Guarded::Completed(Err(PluginError::custom("plugin instance missing"))),
            };
            match start_step(id, phase, outcome, timeout) {
                Step::Done => {}
                Step::Failed(err) => return Err(self.fail_start(slot, life, err, Some(run_token))),
                Step::Cancelled => return Err(self.cancel_start(slot, life, run_token).await),
            }
            match phase {
                "initialize" => {
                    slot.transition(LifecycleState::Initialized)?;
                    slot.transition(LifecycleState::Starting)?;
                }
                _ => slot.transition(LifecycleState::Running).map(|_| ())?,
            }
        }

        slot.update(|r| {
            r.last_started_at = Some(Utc::now());
            r.error_message = None;
        });
        life.health_task = Some(self.spawn_health_task(slot.clone(), run_token.clone()));
        life.run_token = Some(run_token);

        tracing::info!(plugin = %id, "Plugin started");
        self.emit(
            Event::new(types::PLUGIN_STARTED)
                .with_field("plugin", id)
                .with_field("version", record.manifest.version.clone()),
        );
        Ok(())
    }

    /// Record a failed start: registrations removed, state `Error`
    fn fail_start(
        &self,
        slot: &PluginSlot,
        life: &mut Lifecycle,
        err: ManagerError,
        run_token: Option<CancellationToken>,
    ) -> ManagerError {
        let id = slot.id.as_str();
        self.sweep(id);
        if let Some(token) = run_token {
            token.cancel();
        }
        life.instance = None;
        slot.force(LifecycleState::Error);
        self.record_failure(slot, &err);
        tracing::error!(plugin = %id, kind = %err.kind(), error = %err, "Plugin failed to start");
        err
    }

    /// Unwind a start interrupted by a stop request
    async fn cancel_start(
        &self,
        slot: &PluginSlot,
        life: &mut Lifecycle,
        run_token: CancellationToken,
    ) -> ManagerError {
        let id = slot.id.as_str();
        tracing::info!(plugin = %id, "Start cancelled by stop request");
        self.sweep(id);
        run_token.cancel();
        slot.force(LifecycleState::Stopping);

        let timeout = self.inner.config.stop_timeout;
        let outcome = match life.instance.as_mut() {
            Some(instance) => Some(run_hook(instance, Hook::Stop, timeout, None).await),
            None => None,
        };
        if let Some(outcome) = outcome
            && !matches!(outcome, Guarded::Completed(Ok(())))
        {
            tracing::warn!(plugin = %id, "Stop hook of cancelled start did not complete cleanly");
            life.instance = None;
        }

        self.sweep(id);
        self.mark_stopped(slot);
        ManagerError::Cancelled { id: id.to_string() }
    }

    // ─── Stop ────────────────────────────────────────────────────────

    /// Stop a plugin after stopping everything that depends on it.
    ///
    /// Subscriptions and RPC handlers are removed before the plugin's stop
    /// hook runs. A stalled or panicking stop hook is reported but the
    /// plugin still ends `Stopped`.
    pub async fn stop(&self, id: &str) -> Result<(), ManagerError> {
        self.stop_inner(id).await
    }

    fn stop_inner<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ManagerError>> {
        Box::pin(async move {
            let slot = self.slot(id)?;
            slot.request_stop();
            self.stop_dependents(id).await;

            let mut life = slot.lifecycle.lock().await;
            match slot.state() {
                LifecycleState::Running | LifecycleState::Error => {}
                state => {
                    tracing::debug!(plugin = %id, state = %state, "Plugin not active, nothing to stop");
                    return Ok(());
                }
            }
            slot.transition(LifecycleState::Stopping)?;
            // dependents that started while we waited for the lock
            self.stop_dependents(id).await;
            self.teardown(&slot, &mut life).await
        })
    }

    async fn stop_dependents(&self, id: &str) {
        let dependents = self.read_registry().dependents(id);
        for dependent in dependents {
            let active = self.find_slot(&dependent).is_some_and(|s| {
                !matches!(
                    s.state(),
                    LifecycleState::Installed | LifecycleState::Stopped | LifecycleState::Uninstalled
                )
            });
            if !active {
                continue;
            }
            tracing::info!(plugin = %dependent, dependency = %id, "Stopping dependent plugin");
            if let Err(e) = self.stop_inner(&dependent).await {
                tracing::warn!(plugin = %dependent, error = %e, "Dependent did not stop cleanly");
            }
        }
    }

    async fn teardown(&self, slot: &PluginSlot, life: &mut Lifecycle) -> Result<(), ManagerError> {
        let id = slot.id.as_str();
        let (subscriptions, methods, routes) = self.sweep(id);
        tracing::debug!(plugin = %id, subscriptions, methods, routes, "Removed plugin registrations");
        if let Some(token) = life.run_token.take() {
            token.cancel();
        }
        if let Some(task) = life.health_task.take() {
            task.abort();
        }

        let timeout = self.inner.config.stop_timeout;
        let outcome = match life.instance.as_mut() {
            Some(instance) => Some(run_hook(instance, Hook::Stop, timeout, None).await),
            None => None,
        };

        let result = match outcome {
            None | Some(Guarded::Completed(Ok(()))) | Some(Guarded::Cancelled) => Ok(()),
            Some(Guarded::Completed(Err(e))) => {
                tracing::warn!(plugin = %id, error = %e, "Plugin stop hook returned error");
                slot.logs
                    .push(LogLevel::Warn, format!("stop hook returned error: {e}"));
                Ok(())
            }
            Some(Guarded::TimedOut) => {
                tracing::warn!(plugin = %id, timeout = ?timeout, "Plugin stop stalled, forcing stopped");
                life.instance = None;
                Err(ManagerError::StopTimeout {
                    id: id.to_string(),
                    timeout,
                })
            }
            Some(Guarded::Panicked(message)) => {
                tracing::error!(plugin = %id, panic = %message, "Plugin panicked in stop");
                life.instance = None;
                Err(ManagerError::PluginFault {
                    id: id.to_string(),
                    phase: "stop",
                    message,
                })
            }
        };

        // registrations made by the stop hook itself
        self.sweep(id);
        self.mark_stopped(slot);
        if let Err(e) = &result {
            slot.update(|r| r.error_message = Some(e.to_string()));
        }
        result
    }

    fn mark_stopped(&self, slot: &PluginSlot) {
        slot.force(LifecycleState::Stopped);
        slot.update(|r| {
            r.last_stopped_at = Some(Utc::now());
            r.error_message = None;
        });
        slot.health
            .set(HealthStatus::new(HealthState::Unknown, "stopped"));
        tracing::info!(plugin = %slot.id, "Plugin stopped");
        self.emit(Event::new(types::PLUGIN_STOPPED).with_field("plugin", slot.id.clone()));
    }

    /// Remove every subscription, RPC handler and HTTP route of a plugin
    fn sweep(&self, id: &str) -> (usize, usize, usize) {
        (
            self.inner.bus.unsubscribe_plugin(id),
            self.inner.rpc.unregister_plugin(id),
            self.inner.routes.unregister_plugin(id),
        )
    }

    pub async fn restart(&self, id: &str) -> Result<(), ManagerError> {
        self.stop(id).await?;
        self.start(id).await
    }

    // ─── Enable / disable / uninstall ────────────────────────────────

    pub async fn enable(&self, id: &str) -> Result<(), ManagerError> {
        let slot = self.slot(id)?;
        slot.update(|r| r.enabled = true);
        self.persist(&slot).await;
        tracing::info!(plugin = %id, "Plugin enabled");
        self.start(id).await
    }

    /// Persist `enabled = false` and stop the plugin (dependents first).
    ///
    /// Dependents are stopped but stay enabled.
    pub async fn disable(&self, id: &str) -> Result<(), ManagerError> {
        let slot = self.slot(id)?;
        slot.update(|r| r.enabled = false);
        self.persist(&slot).await;
        tracing::info!(plugin = %id, "Plugin disabled");
        self.stop(id).await
    }

    /// Remove a plugin that is not running
    pub async fn uninstall(&self, id: &str) -> Result<(), ManagerError> {
        let slot = self.slot(id)?;
        let mut life = slot.lifecycle.lock().await;
        let state = slot.state();
        if !state.can_uninstall() {
            return Err(ManagerError::InvalidState {
                id: id.to_string(),
                state,
                action: "uninstall",
            });
        }
        slot.transition(LifecycleState::Uninstalled)?;
        {
            let mut registry = self.write_registry();
            registry.remove(id);
            self.write_slots().remove(id);
        }
        self.sweep(id);
        life.unload();
        drop(life);

        if let Err(e) = self.inner.store.delete(&plugin_state_key(id)).await {
            tracing::warn!(plugin = %id, kind = %ErrorKind::Persistence, error = %e, "Failed to delete plugin state");
        }
        tracing::info!(plugin = %id, "Plugin uninstalled");
        Ok(())
    }

    // ─── RPC ─────────────────────────────────────────────────────────

    /// Invoke a method registered by a running plugin.
    ///
    /// A panicking handler yields `RpcInternalError`; the plugin keeps running.
    pub async fn route_rpc(
        &self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ManagerError> {
        let slot = self.slot(id)?;
        let state = slot.state();
        if state != LifecycleState::Running {
            return Err(ManagerError::PluginNotRunning {
                id: id.to_string(),
                state,
            });
        }
        let handler =
            self.inner
                .rpc
                .get(id, method)
                .ok_or_else(|| ManagerError::MethodNotFound {
                    id: id.to_string(),
                    method: method.to_string(),
                })?;

        let timeout = self.inner.config.rpc_timeout;
        match guarded(async move { handler(params).await }, timeout, None).await {
            Guarded::Completed(Ok(value)) => Ok(value),
            Guarded::Completed(Err(e)) => Err(ManagerError::RpcHandlerError {
                id: id.to_string(),
                method: method.to_string(),
                message: e.to_string(),
            }),
            Guarded::TimedOut | Guarded::Cancelled => {
                tracing::warn!(plugin = %id, method = %method, timeout = ?timeout, "RPC call timed out");
                Err(ManagerError::RpcTimeout {
                    id: id.to_string(),
                    method: method.to_string(),
                    timeout,
                })
            }
            Guarded::Panicked(message) => {
                tracing::error!(plugin = %id, method = %method, panic = %message, "RPC handler panicked");
                slot.logs
                    .push(LogLevel::Error, format!("method '{method}' panicked: {message}"));
                Err(ManagerError::RpcInternalError {
                    id: id.to_string(),
                    method: method.to_string(),
                    message,
                })
            }
        }
    }

    pub fn methods(&self, id: &str) -> Vec<String> {
        self.inner.rpc.methods(id)
    }

    // ─── HTTP routes ─────────────────────────────────────────────────

    /// Serve a request addressed to a route mounted by a running plugin.
    ///
    /// `path` is relative to the plugin's mount point. Handler failures are
    /// reported like RPC failures, labelled `"METHOD /path"`.
    pub async fn dispatch_route(
        &self,
        id: &str,
        method: HttpMethod,
        path: &str,
        mut request: RouteRequest,
    ) -> Result<RouteResponse, ManagerError> {
        let slot = self.slot(id)?;
        let state = slot.state();
        if state != LifecycleState::Running {
            return Err(ManagerError::PluginNotRunning {
                id: id.to_string(),
                state,
            });
        }
        let (handler, params) = self
            .inner
            .routes
            .match_route(id, method, path)
            .ok_or_else(|| ManagerError::RouteNotFound {
                id: id.to_string(),
                route: format!("{method} {path}"),
            })?;
        request.params = params;

        let label = format!("{method} {path}");
        let timeout = self.inner.config.rpc_timeout;
        match guarded(handler(request), timeout, None).await {
            Guarded::Completed(Ok(response)) => Ok(response),
            Guarded::Completed(Err(e)) => Err(ManagerError::RpcHandlerError {
                id: id.to_string(),
                method: label,
                message: e.to_string(),
            }),
            Guarded::TimedOut | Guarded::Cancelled => {
                tracing::warn!(plugin = %id, route = %label, timeout = ?timeout, "Route handler timed out");
                Err(ManagerError::RpcTimeout {
                    id: id.to_string(),
                    method: label,
                    timeout,
                })
            }
            Guarded::Panicked(message) => {
                tracing::error!(plugin = %id, route = %label, panic = %message, "Route handler panicked");
                slot.logs
                    .push(LogLevel::Error, format!("route '{label}' panicked: {message}"));
                Err(ManagerError::RpcInternalError {
                    id: id.to_string(),
                    method: label,
                    message,
                })
            }
        }
    }

    pub fn routes(&self, id: &str) -> Vec<String> {
        self.inner.routes.routes(id)
    }

    // ─── Health ──────────────────────────────────────────────────────

    fn spawn_health_task(&self, slot: Arc<PluginSlot>, run_token: CancellationToken) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.monitor.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = run_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = PluginManager { inner };
                // a transition holds the lock; try again next tick
                let Ok(mut life) = slot.lifecycle.try_lock() else {
                    continue;
                };
                if run_token.is_cancelled() || slot.state() != LifecycleState::Running {
                    break;
                }
                if manager.poll_health(&slot, &mut life, false).await.is_break() {
                    break;
                }
            }
            tracing::trace!(plugin = %slot.id, "Health poller exited");
        })
    }

    async fn poll_health(&self, slot: &PluginSlot, life: &mut Lifecycle, external: bool) -> ControlFlow<()> {
        let id = slot.id.as_str();
        let result = match life.instance.as_ref() {
            Some(instance) => {
                self.inner
                    .monitor
                    .run_check(with_plugin!(instance, p => p.health_check()))
                    .await
            }
            None => return ControlFlow::Break(()),
        };

        match result {
            CheckOutcome::Reported(Some(mut status)) => {
                if status.last_checked.is_none() {
                    status.last_checked = Some(Utc::now());
                }
                slot.health.set(status);
            }
            CheckOutcome::Reported(None) => {}
            CheckOutcome::TimedOut => {
                tracing::warn!(plugin = %id, "Health check timed out");
                slot.health.set_unhealthy("health check timed out");
            }
            CheckOutcome::Panicked(message) => {
                let err = ManagerError::PluginFault {
                    id: id.to_string(),
                    phase: "health_check",
                    message,
                };
                self.fault(slot, life, err, external);
                return ControlFlow::Break(());
            }
        }

        let health = slot.health.get();
        if health.state.is_impaired() {
            self.emit(
                Event::new(types::PLUGIN_HEALTH)
                    .with_field("plugin", id)
                    .with_field("state", serde_json::to_value(health.state).unwrap_or_default())
                    .with_field("message", health.message),
            );
        }
        ControlFlow::Continue(())
    }

    /// A running plugin faulted outside a lifecycle call
    fn fault(&self, slot: &PluginSlot, life: &mut Lifecycle, err: ManagerError, abort_poller: bool) {
        let id = slot.id.as_str();
        self.sweep(id);
        if let Some(token) = life.run_token.take() {
            token.cancel();
        }
        if let Some(task) = life.health_task.take()
            && abort_poller
        {
            task.abort();
        }
        life.instance = None;
        slot.force(LifecycleState::Error);
        self.record_failure(slot, &err);
        tracing::error!(plugin = %id, kind = %err.kind(), error = %err, "Plugin faulted");
    }

    fn record_failure(&self, slot: &PluginSlot, err: &ManagerError) {
        let message = err.to_string();
        let critical = slot.update(|r| {
            r.error_message = Some(message.clone());
            r.manifest.critical
        });
        slot.health.set_unhealthy(message.clone());
        slot.logs.push(LogLevel::Error, message.clone());
        if critical {
            tracing::error!(plugin = %slot.id, "Critical plugin failed, system degraded");
        }
        self.emit(
            Event::new(types::PLUGIN_ERROR)
                .with_field("plugin", slot.id.clone())
                .with_field("kind", err.kind().as_str())
                .with_field("error", message),
        );
    }

    /// Check a running plugin now and return its health
    pub async fn check_health(&self, id: &str) -> Result<HealthStatus, ManagerError> {
        let slot = self.slot(id)?;
        let mut life = slot.lifecycle.lock().await;
        if slot.state() == LifecycleState::Running {
            let _ = self.poll_health(&slot, &mut life, true).await;
        }
        Ok(slot.health.get())
    }

    pub fn system_health(&self) -> SystemHealth {
        let plugins = self
            .slots_snapshot()
            .into_iter()
            .map(|slot| {
                let record = slot.record();
                HealthSnapshot {
                    id: slot.id.clone(),
                    critical: record.manifest.critical,
                    lifecycle: record.state,
                    health: slot.health.get(),
                }
            })
            .collect();
        SystemHealth::from_snapshots(plugins)
    }

    // ─── Queries ─────────────────────────────────────────────────────

    pub fn status(&self, id: &str) -> Result<PluginStatus, ManagerError> {
        let slot = self.slot(id)?;
        Ok(self.status_of(&slot))
    }

    pub fn list(&self) -> Vec<PluginStatus> {
        self.slots_snapshot()
            .iter()
            .map(|slot| self.status_of(slot))
            .collect()
    }

    pub fn state(&self, id: &str) -> Result<LifecycleState, ManagerError> {
        Ok(self.slot(id)?.state())
    }

    pub fn plugin_logs(&self, id: &str, limit: usize) -> Result<Vec<LogEntry>, ManagerError> {
        Ok(self.slot(id)?.logs.recent(limit))
    }

    pub fn plugin_config(&self, id: &str) -> Result<PluginConfig, ManagerError> {
        Ok(self.slot(id)?.record().effective_config())
    }

    fn status_of(&self, slot: &PluginSlot) -> PluginStatus {
        let record = slot.record();
        let manifest = &record.manifest;
        PluginStatus {
            id: slot.id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            category: manifest.category.clone(),
            source: slot.source.label(),
            critical: manifest.critical,
            state: record.state,
            enabled: record.enabled,
            health: slot.health.get(),
            error_message: record.error_message.clone(),
            install_path: record.install_path.clone(),
            installed_at: record.installed_at,
            last_started_at: record.last_started_at,
            last_stopped_at: record.last_stopped_at,
            dependencies: manifest.dependencies.clone(),
            capabilities: manifest.capabilities.clone(),
            methods: self.inner.rpc.methods(&slot.id),
            routes: self.inner.routes.routes(&slot.id),
            subscriptions: self.inner.bus.subscription_count(&slot.id),
        }
    }

    // ─── Configuration ───────────────────────────────────────────────

    /// Replace a plugin's override config and persist it.
    ///
    /// A running service plugin is told through `on_config_change`.
    /// Returns the effective configuration.
    pub async fn update_config(
        &self,
        id: &str,
        config: PluginConfig,
    ) -> Result<PluginConfig, ManagerError> {
        let slot = self.slot(id)?;
        let effective = slot.update(|r| {
            r.override_config = config;
            r.effective_config()
        });
        self.persist(&slot).await;

        let mut life = slot.lifecycle.lock().await;
        if slot.state() == LifecycleState::Running {
            let timeout = self.inner.config.rpc_timeout;
            let outcome = match life.instance.as_mut() {
                Some(PluginKind::Service(service)) => {
                    Some(guarded(service.on_config_change(&effective), timeout, None).await)
                }
                _ => None,
            };
            match outcome {
                None | Some(Guarded::Completed(Ok(()))) | Some(Guarded::Cancelled) => {}
                Some(Guarded::Completed(Err(e))) => {
                    return Err(ManagerError::PluginFailed {
                        id: id.to_string(),
                        phase: "config_change",
                        message: e.to_string(),
                    });
                }
                Some(Guarded::TimedOut) => {
                    return Err(ManagerError::PluginFailed {
                        id: id.to_string(),
                        phase: "config_change",
                        message: format!("timed out after {timeout:?}"),
                    });
                }
                Some(Guarded::Panicked(message)) => {
                    let err = ManagerError::PluginFault {
                        id: id.to_string(),
                        phase: "config_change",
                        message,
                    };
                    self.fault(&slot, &mut life, err.clone(), true);
                    return Err(err);
                }
            }
        }
        drop(life);

        self.emit(Event::new(types::CONFIG_CHANGED).with_field("plugin", id));
        Ok(effective)
    }

    // ─── Cameras & notifications ─────────────────────────────────────

    /// Cameras listed by running camera plugins.
    ///
    /// Plugins in the middle of a transition are skipped.
    pub fn cameras(&self) -> Vec<Camera> {
        let mut cameras = Vec::new();
        for slot in self.slots_snapshot() {
            if slot.state() != LifecycleState::Running {
                continue;
            }
            let Ok(life) = slot.lifecycle.try_lock() else {
                continue;
            };
            if let Some(PluginKind::Camera(plugin)) = life.instance.as_ref() {
                match std::panic::catch_unwind(AssertUnwindSafe(|| plugin.cameras())) {
                    Ok(list) => cameras.extend(list),
                    Err(_) => {
                        tracing::error!(plugin = %slot.id, "Plugin panicked listing cameras");
                    }
                }
            }
        }
        cameras
    }

    /// Ask every running camera plugin to discover cameras
    pub async fn discover_cameras(&self) -> Vec<Camera> {
        let timeout = self.inner.config.rpc_timeout;
        let mut cameras = Vec::new();
        for slot in self.slots_snapshot() {
            let mut life = slot.lifecycle.lock().await;
            if slot.state() != LifecycleState::Running {
                continue;
            }
            let outcome = match life.instance.as_mut() {
                Some(PluginKind::Camera(plugin)) => {
                    guarded(plugin.discover_cameras(), timeout, None).await
                }
                _ => continue,
            };
            match outcome {
                Guarded::Completed(Ok(found)) => {
                    tracing::debug!(plugin = %slot.id, count = found.len(), "Camera discovery finished");
                    cameras.extend(found);
                }
                Guarded::Completed(Err(e)) => {
                    tracing::warn!(plugin = %slot.id, error = %e, "Camera discovery failed");
                }
                Guarded::TimedOut | Guarded::Cancelled => {
                    tracing::warn!(plugin = %slot.id, "Camera discovery timed out");
                }
                Guarded::Panicked(message) => {
                    let err = ManagerError::PluginFault {
                        id: slot.id.clone(),
                        phase: "discover_cameras",
                        message,
                    };
                    self.fault(&slot, &mut life, err, true);
                }
            }
        }
        cameras
    }

    /// Send a PTZ command to the camera plugin that manages `camera_id`.
    ///
    /// The owning plugin must declare the `ptz` capability. A panicking
    /// handler is reported like an RPC panic; the plugin keeps running.
    pub async fn ptz_control(
        &self,
        camera_id: &str,
        command: &PtzCommand,
    ) -> Result<(), ManagerError> {
        let timeout = self.inner.config.rpc_timeout;
        for slot in self.slots_snapshot() {
            let life = slot.lifecycle.lock().await;
            if slot.state() != LifecycleState::Running {
                continue;
            }
            let Some(PluginKind::Camera(plugin)) = life.instance.as_ref() else {
                continue;
            };
            let owns = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.cameras()))
                .map(|cameras| cameras.iter().any(|c| c.id == camera_id))
                .unwrap_or(false);
            if !owns {
                continue;
            }
            if !slot.manifest().has_capability(&Capability::Ptz) {
                return Err(ManagerError::CapabilityDenied {
                    plugin: slot.id.clone(),
                    action: format!("PTZ control of camera '{camera_id}'"),
                });
            }

            tracing::debug!(plugin = %slot.id, camera = %camera_id, action = ?command.action, "PTZ command");
            return match guarded(plugin.ptz(camera_id, command), timeout, None).await {
                Guarded::Completed(Ok(())) => Ok(()),
                Guarded::Completed(Err(e)) => Err(ManagerError::RpcHandlerError {
                    id: slot.id.clone(),
                    method: "ptz".to_string(),
                    message: e.to_string(),
                }),
                Guarded::TimedOut | Guarded::Cancelled => Err(ManagerError::RpcTimeout {
                    id: slot.id.clone(),
                    method: "ptz".to_string(),
                    timeout,
                }),
                Guarded::Panicked(message) => {
                    tracing::error!(plugin = %slot.id, camera = %camera_id, panic = %message, "PTZ handler panicked");
                    slot.logs
                        .push(LogLevel::Error, format!("ptz on '{camera_id}' panicked: {message}"));
                    Err(ManagerError::RpcInternalError {
                        id: slot.id.clone(),
                        method: "ptz".to_string(),
                        message,
                    })
                }
            };
        }
        Err(ManagerError::CameraNotFound {
            camera_id: camera_id.to_string(),
        })
    }

    /// Deliver a notification through every running notification plugin
    pub async fn notify(&self, notification: &Notification) -> NotifyReport {
        let timeout = self.inner.config.rpc_timeout;
        let mut report = NotifyReport::default();
        for slot in self.slots_snapshot() {
            let mut life = slot.lifecycle.lock().await;
            if slot.state() != LifecycleState::Running {
                continue;
            }
            let outcome = match life.instance.as_ref() {
                Some(PluginKind::Notification(plugin)) => {
                    guarded(plugin.notify(notification), timeout, None).await
                }
                _ => continue,
            };
            match outcome {
                Guarded::Completed(Ok(())) => report.delivered.push(slot.id.clone()),
                Guarded::Completed(Err(e)) => {
                    tracing::warn!(plugin = %slot.id, error = %e, "Notification delivery failed");
                    report.failed.push((slot.id.clone(), e.to_string()));
                }
                Guarded::TimedOut | Guarded::Cancelled => {
                    report
                        .failed
                        .push((slot.id.clone(), format!("timed out after {timeout:?}")));
                }
                Guarded::Panicked(message) => {
                    report.failed.push((slot.id.clone(), message.clone()));
                    let err = ManagerError::PluginFault {
                        id: slot.id.clone(),
                        phase: "notify",
                        message,
                    };
                    self.fault(&slot, &mut life, err, true);
                }
            }
        }
        report
    }

    /// Publish a host-originated event
    pub fn publish(&self, event: Event) -> PublishReport {
        self.inner.bus.publish(event)
    }

    // ─── Bulk operations ─────────────────────────────────────────────

    /// Start every enabled plugin, one dependency level at a time.
    ///
    /// Plugins within a level start concurrently.
    pub async fn start_all(&self) -> StartAllReport {
        let (levels, blocked) = {
            let registry = self.read_registry();
            (registry.startup_levels(), registry.blocked())
        };

        let mut report = StartAllReport::default();
        for id in blocked {
            tracing::warn!(plugin = %id, "Skipping plugin with unresolvable dependencies");
            report.skipped.push(id);
        }

        for level in levels {
            let mut batch = Vec::new();
            for id in level {
                match self.find_slot(&id) {
                    Some(slot) if slot.enabled() => batch.push(id),
                    Some(_) => report.skipped.push(id),
                    None => {}
                }
            }
            let results = join_all(batch.iter().map(|id| self.start(id))).await;
            for (id, result) in batch.into_iter().zip(results) {
                match result {
                    Ok(()) => report.started.push(id),
                    Err(e) => report.failed.push((id, e)),
                }
            }
        }

        tracing::info!(
            started = report.started.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Plugin startup complete"
        );
        report
    }

    /// Stop every active plugin in reverse dependency order
    pub async fn stop_all(&self) -> Vec<(String, ManagerError)> {
        let levels = self.read_registry().startup_levels();
        let mut failures = Vec::new();
        for level in levels.into_iter().rev() {
            let results = join_all(level.iter().map(|id| self.stop(id))).await;
            for (id, result) in level.into_iter().zip(results) {
                if let Err(e) = result {
                    failures.push((id, e));
                }
            }
        }
        // plugins outside the current order, e.g. cycle members installed later
        for slot in self.slots_snapshot() {
            if matches!(slot.state(), LifecycleState::Running | LifecycleState::Error)
                && let Err(e) = self.stop(&slot.id).await
            {
                failures.push((slot.id.clone(), e));
            }
        }
        failures
    }

    /// Stop all plugins, flush the store and detach the stream fanout
    pub async fn shutdown(&self) -> Vec<(String, ManagerError)> {
        tracing::info!("Shutting down plugins");
        let failures = self.stop_all().await;
        if let Err(e) = self.inner.store.flush().await {
            tracing::warn!(kind = %ErrorKind::Persistence, error = %e, "Failed to flush store on shutdown");
        }
        self.inner.shutdown.cancel();
        failures
    }

    // ─── Internals ───────────────────────────────────────────────────

    fn runtime_for(
        &self,
        slot: &PluginSlot,
        record: &PluginRecord,
        run_token: CancellationToken,
    ) -> PluginRuntime {
        PluginRuntime::new(RuntimeParts {
            plugin_id: slot.id.clone(),
            capabilities: record.manifest.capabilities.clone(),
            config: record.effective_config(),
            install_path: record.install_path.clone(),
            store: Arc::new(ScopedStore::new(
                self.inner.store.clone(),
                plugin_prefix(&slot.id),
            )),
            broker: self.inner.bus.clone(),
            methods: self.inner.rpc.clone(),
            routes: self.inner.routes.clone(),
            health: slot.health.clone(),
            logs: slot.logs.clone(),
            shutdown: run_token,
            subscriber_capacity: self.inner.config.subscriber_capacity,
        })
    }

    fn check_resolvable(&self, id: &str) -> Result<(), ManagerError> {
        let registry = self.read_registry();
        let missing = registry.missing_dependencies(id);
        if !missing.is_empty() {
            return Err(ManagerError::DependencyMissing {
                id: id.to_string(),
                missing,
            });
        }
        if let Some(members) = registry.cycle_containing(id) {
            return Err(ManagerError::DependencyCycle {
                id: id.to_string(),
                members,
            });
        }
        Ok(())
    }

    /// Plugin directory `config.toml`, overlaid with the daemon's `[plugin.<id>]`
    fn base_config(&self, id: &str, install_path: Option<&Path>) -> PluginConfig {
        let mut config = install_path
            .map(|dir| read_dir_config(id, dir))
            .unwrap_or_default();
        if let Some(daemon) = self.inner.config.plugin_configs.get(id) {
            config.merge(daemon);
        }
        config
    }

    async fn load_persisted(&self, id: &str) -> Option<PersistedState> {
        match self.inner.store.get(&plugin_state_key(id)).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!(plugin = %id, error = %e, "Ignoring unreadable persisted plugin state");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(plugin = %id, kind = %ErrorKind::Persistence, error = %e, "Failed to load plugin state");
                None
            }
        }
    }

    async fn persist(&self, slot: &PluginSlot) {
        let record = slot.record();
        let state = PersistedState {
            enabled: record.enabled,
            config: record.override_config.as_map().clone(),
        };
        let value = match serde_json::to_value(&state) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(plugin = %slot.id, error = %e, "Failed to encode plugin state");
                return;
            }
        };
        if let Err(e) = self
            .inner
            .store
            .put(&plugin_state_key(&slot.id), value)
            .await
        {
            tracing::warn!(plugin = %slot.id, kind = %ErrorKind::Persistence, error = %e, "Failed to persist plugin state");
        }
    }

    fn emit(&self, event: Event) {
        self.inner.bus.publish(event);
    }

    fn slot(&self, id: &str) -> Result<Arc<PluginSlot>, ManagerError> {
        self.find_slot(id).ok_or_else(|| ManagerError::not_found(id))
    }

    fn find_slot(&self, id: &str) -> Option<Arc<PluginSlot>> {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn slots_snapshot(&self) -> Vec<Arc<PluginSlot>> {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<PluginSlot>>> {
        self.inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, ManifestRegistry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, ManifestRegistry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_dir_config(id: &str, dir: &Path) -> PluginConfig {
    let path = dir.join("config.toml");
    if !path.is_file() {
        return PluginConfig::new();
    }
    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|content| toml::from_str::<Value>(&content).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => PluginConfig::from_value(value),
        Err(e) => {
            tracing::warn!(plugin = %id, path = %path.display(), error = %e, "Ignoring invalid plugin config");
            PluginConfig::new()
        }
    }
}
