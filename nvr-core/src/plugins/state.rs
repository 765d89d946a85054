//! Plugin lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a plugin is in its lifecycle.
///
/// ```text
/// Installed -> Initializing -> Initialized -> Starting -> Running -> Stopping -> Stopped
///                  |                              |          |                     |
///                  +------------> Error <---------+----------+        (start again)
/// ```
///
/// `Uninstalled` is terminal and reachable from `Installed`, `Stopped` and `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Installed,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Uninstalled,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Uninstalled => "uninstalled",
        }
    }

    /// In the middle of a start or stop
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Initialized | Self::Starting | Self::Stopping
        )
    }

    /// States a fresh start may begin from
    pub fn can_start(self) -> bool {
        matches!(self, Self::Installed | Self::Stopped | Self::Error)
    }

    pub fn can_uninstall(self) -> bool {
        matches!(self, Self::Installed | Self::Stopped | Self::Error)
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Installed, Initializing | Uninstalled)
                | (Initializing, Initialized | Error | Stopping)
                | (Initialized, Starting | Error | Stopping)
                | (Starting, Running | Error | Stopping)
                | (Running, Stopping | Error)
                | (Stopping, Stopped)
                | (Stopped, Initializing | Uninstalled)
                | (Error, Initializing | Stopping | Uninstalled)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
