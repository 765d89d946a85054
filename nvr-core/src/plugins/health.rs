//! HealthMonitor - per-plugin checks and the system-wide aggregate

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nvr_plugin_api::{HealthState, HealthStatus};
use serde::Serialize;

use super::guard::{Guarded, guarded};
use super::state::LifecycleState;

/// One plugin's contribution to system health
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub id: String,
    pub critical: bool,
    pub lifecycle: LifecycleState,
    pub health: HealthStatus,
}

/// Aggregate health of the whole daemon
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub state: HealthState,
    pub message: String,
    pub plugins: Vec<HealthSnapshot>,
    pub checked_at: DateTime<Utc>,
}

/// Fold per-plugin health into one state.
///
/// - `Unhealthy` if any critical plugin is unhealthy
/// - `Degraded` if any plugin is degraded or unhealthy, or a critical plugin is not running
/// - `Healthy` otherwise
pub fn aggregate(plugins: &[HealthSnapshot]) -> (HealthState, String) {
    let critical_down: Vec<&str> = plugins
        .iter()
        .filter(|p| p.critical && p.health.state == HealthState::Unhealthy)
        .map(|p| p.id.as_str())
        .collect();
    if !critical_down.is_empty() {
        return (
            HealthState::Unhealthy,
            format!("critical plugins unhealthy: {}", critical_down.join(", ")),
        );
    }

    let impaired: Vec<&str> = plugins
        .iter()
        .filter(|p| p.health.state.is_impaired())
        .map(|p| p.id.as_str())
        .collect();
    let critical_idle: Vec<&str> = plugins
        .iter()
        .filter(|p| p.critical && p.lifecycle != LifecycleState::Running)
        .map(|p| p.id.as_str())
        .collect();

    if impaired.is_empty() && critical_idle.is_empty() {
        return (HealthState::Healthy, "all plugins healthy".to_string());
    }

    let mut reasons = Vec::new();
    if !impaired.is_empty() {
        reasons.push(format!("impaired: {}", impaired.join(", ")));
    }
    if !critical_idle.is_empty() {
        reasons.push(format!("critical not running: {}", critical_idle.join(", ")));
    }
    (HealthState::Degraded, reasons.join("; "))
}

impl SystemHealth {
    pub fn from_snapshots(plugins: Vec<HealthSnapshot>) -> Self {
        let (state, message) = aggregate(&plugins);
        Self {
            state,
            message,
            plugins,
            checked_at: Utc::now(),
        }
    }
}

/// Outcome of a single health check
#[derive(Debug)]
pub enum CheckOutcome {
    Reported(Option<HealthStatus>),
    TimedOut,
    Panicked(String),
}

/// Polling policy for running plugins
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    pub interval: Duration,
    pub check_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(interval: Duration, check_timeout: Duration) -> Self {
        Self {
            interval,
            check_timeout,
        }
    }

    /// Run one health check under the check timeout and a panic guard
    pub async fn run_check<F>(&self, check: F) -> CheckOutcome
    where
        F: Future<Output = Option<HealthStatus>>,
    {
        match guarded(check, self.check_timeout, None).await {
            Guarded::Completed(status) => CheckOutcome::Reported(status),
            Guarded::TimedOut | Guarded::Cancelled => CheckOutcome::TimedOut,
            Guarded::Panicked(message) => CheckOutcome::Panicked(message),
        }
    }
}
