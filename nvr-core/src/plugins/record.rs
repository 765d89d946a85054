//! Per-plugin bookkeeping owned by the manager

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use libloading::Library;
use nvr_plugin_api::{
    Capability, HealthReporter, HealthStatus, LogBuffer, PluginConfig, PluginKind, PluginManifest,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::ManagerError;
use super::loader::PluginSource;
use super::state::LifecycleState;

/// Manager-side record of one installed plugin
#[derive(Debug, Clone)]
pub(crate) struct PluginRecord {
    pub manifest: Arc<PluginManifest>,
    pub state: LifecycleState,
    pub enabled: bool,
    pub install_path: Option<PathBuf>,
    /// Plugin directory `config.toml` merged with the daemon's `[plugin.<id>]`
    pub base_config: PluginConfig,
    /// Set through the management API, persisted
    pub override_config: PluginConfig,
    pub error_message: Option<String>,
    /// `error_message` describes a missing dependency or a cycle
    pub dependency_issue: bool,
    pub installed_at: DateTime<Utc>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_stopped_at: Option<DateTime<Utc>>,
}

impl PluginRecord {
    pub fn effective_config(&self) -> PluginConfig {
        let mut config = self.base_config.clone();
        config.merge(&self.override_config);
        config
    }
}

/// What survives a daemon restart, stored under `plugin-state/<id>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PersistedState {
    pub enabled: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Management view of a plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub source: &'static str,
    pub critical: bool,
    pub state: LifecycleState,
    pub enabled: bool,
    pub health: HealthStatus,
    pub error_message: Option<String>,
    pub install_path: Option<PathBuf>,
    pub installed_at: DateTime<Utc>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_stopped_at: Option<DateTime<Utc>>,
    pub dependencies: Vec<String>,
    pub capabilities: Vec<Capability>,
    pub methods: Vec<String>,
    pub routes: Vec<String>,
    pub subscriptions: usize,
}

/// Plugin code and the handles tied to one run.
///
/// `instance` is declared before `library` so it is dropped first.
#[derive(Default)]
pub(crate) struct Lifecycle {
    pub instance: Option<PluginKind>,
    pub library: Option<Library>,
    pub run_token: Option<CancellationToken>,
    pub health_task: Option<JoinHandle<()>>,
}

impl Lifecycle {
    /// Drop the plugin instance, then its library
    pub fn unload(&mut self) {
        self.instance = None;
        self.library = None;
    }
}

pub(crate) struct PluginSlot {
    pub id: String,
    pub source: PluginSource,
    pub record: RwLock<PluginRecord>,
    pub health: HealthReporter,
    pub logs: LogBuffer,
    /// Serializes lifecycle transitions of this plugin
    pub lifecycle: tokio::sync::Mutex<Lifecycle>,
    /// Cancels the start currently in flight, if any
    pub pending_start: Mutex<Option<CancellationToken>>,
    /// Bumped by every stop request; a start begun under an older value is abandoned
    stop_epoch: AtomicU64,
}

impl PluginSlot {
    pub fn new(record: PluginRecord, source: PluginSource, log_capacity: usize) -> Self {
        Self {
            id: record.manifest.id.clone(),
            source,
            record: RwLock::new(record),
            health: HealthReporter::new(),
            logs: LogBuffer::new(log_capacity),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            pending_start: Mutex::new(None),
            stop_epoch: AtomicU64::new(0),
        }
    }

    pub fn record(&self) -> PluginRecord {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut PluginRecord) -> R) -> R {
        f(&mut self.record.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn state(&self) -> LifecycleState {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn enabled(&self) -> bool {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .enabled
    }

    pub fn manifest(&self) -> Arc<PluginManifest> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .manifest
            .clone()
    }

    /// Move to `next` if the state machine allows it
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, ManagerError> {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        let current = record.state;
        if !current.can_transition_to(next) {
            return Err(ManagerError::InvalidState {
                id: self.id.clone(),
                state: current,
                action: next.as_str(),
            });
        }
        record.state = next;
        tracing::debug!(plugin = %self.id, from = %current, to = %next, "State transition");
        Ok(current)
    }

    /// Like [`Self::transition`], logging instead of failing
    pub fn force(&self, next: LifecycleState) {
        if let Err(e) = self.transition(next) {
            tracing::warn!(plugin = %self.id, error = %e, "Unexpected state transition");
        }
    }

    pub fn set_pending_start(&self, token: Option<CancellationToken>) {
        *self
            .pending_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn stop_epoch(&self) -> u64 {
        self.stop_epoch.load(Ordering::SeqCst)
    }

    /// Invalidate starts begun before now and cancel the hook in flight.
    ///
    /// Returns whether a hook was running.
    pub fn request_stop(&self) -> bool {
        self.stop_epoch.fetch_add(1, Ordering::SeqCst);
        match self
            .pending_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
