//! Self-reported plugin health

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    /// Degraded or worse.
    pub fn is_impaired(self) -> bool {
        matches!(self, Self::Degraded | Self::Unhealthy)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl HealthStatus {
    pub fn new(state: HealthState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            last_checked: Some(Utc::now()),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthState::Healthy, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthState::Degraded, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthState::Unhealthy, message)
    }
}

/// Shared health cell for one plugin.
///
/// The plugin writes through its runtime; the host reads it for status
/// snapshots and overwrites it when it forces a terminal state.
#[derive(Debug, Clone, Default)]
pub struct HealthReporter {
    inner: Arc<RwLock<HealthStatus>>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> HealthStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> HealthState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn set(&self, status: HealthStatus) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn set_healthy(&self, message: impl Into<String>) {
        self.set(HealthStatus::healthy(message));
    }

    pub fn set_degraded(&self, message: impl Into<String>) {
        self.set(HealthStatus::degraded(message));
    }

    pub fn set_unhealthy(&self, message: impl Into<String>) {
        self.set(HealthStatus::unhealthy(message));
    }

    /// Back to `Unknown`, used when a plugin is (re)started.
    pub fn reset(&self) {
        self.set(HealthStatus::default());
    }
}
