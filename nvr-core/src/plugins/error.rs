//! Plugin manager error types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::registry::ManifestError;
use super::state::LifecycleState;

/// Machine-readable classification of a manager error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ManifestInvalid,
    DuplicateId,
    DependencyMissing,
    DependencyCycle,
    DependencyUnavailable,
    StartTimeout,
    StopTimeout,
    PluginFault,
    PluginFailed,
    MethodNotFound,
    RouteNotFound,
    CameraNotFound,
    PluginNotRunning,
    RpcTimeout,
    RpcInternalError,
    RpcHandlerError,
    EventDeliveryDropped,
    NotFound,
    InvalidState,
    PluginDisabled,
    LoadFailed,
    Cancelled,
    CapabilityDenied,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestInvalid => "manifest_invalid",
            Self::DuplicateId => "duplicate_id",
            Self::DependencyMissing => "dependency_missing",
            Self::DependencyCycle => "dependency_cycle",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::StartTimeout => "start_timeout",
            Self::StopTimeout => "stop_timeout",
            Self::PluginFault => "plugin_fault",
            Self::PluginFailed => "plugin_failed",
            Self::MethodNotFound => "method_not_found",
            Self::RouteNotFound => "route_not_found",
            Self::CameraNotFound => "camera_not_found",
            Self::PluginNotRunning => "plugin_not_running",
            Self::RpcTimeout => "rpc_timeout",
            Self::RpcInternalError => "rpc_internal_error",
            Self::RpcHandlerError => "rpc_handler_error",
            Self::EventDeliveryDropped => "event_delivery_dropped",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::PluginDisabled => "plugin_disabled",
            Self::LoadFailed => "load_failed",
            Self::Cancelled => "cancelled",
            Self::CapabilityDenied => "capability_denied",
            Self::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`super::PluginManager`] operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManagerError {
    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("Plugin '{id}' is already installed")]
    DuplicateId { id: String },

    #[error("Plugin '{id}' depends on missing plugins: {}", missing.join(", "))]
    DependencyMissing { id: String, missing: Vec<String> },

    #[error("Plugin '{id}' is part of a dependency cycle: {}", members.join(" -> "))]
    DependencyCycle { id: String, members: Vec<String> },

    #[error("Plugin '{id}' cannot start: dependency '{dependency}' is unavailable ({reason})")]
    DependencyUnavailable {
        id: String,
        dependency: String,
        reason: String,
    },

    #[error("Plugin '{id}' timed out in {phase} after {timeout:?}")]
    StartTimeout {
        id: String,
        phase: &'static str,
        timeout: Duration,
    },

    #[error("Plugin '{id}' did not stop within {timeout:?}")]
    StopTimeout { id: String, timeout: Duration },

    #[error("Plugin '{id}' panicked in {phase}: {message}")]
    PluginFault {
        id: String,
        phase: &'static str,
        message: String,
    },

    #[error("Plugin '{id}' failed in {phase}: {message}")]
    PluginFailed {
        id: String,
        phase: &'static str,
        message: String,
    },

    #[error("Plugin '{id}' has no method '{method}'")]
    MethodNotFound { id: String, method: String },

    #[error("Plugin '{id}' has no route '{route}'")]
    RouteNotFound { id: String, route: String },

    #[error("No running camera plugin manages camera '{camera_id}'")]
    CameraNotFound { camera_id: String },

    #[error("Plugin '{id}' is not running (state: {state})")]
    PluginNotRunning { id: String, state: LifecycleState },

    #[error("Method '{method}' on plugin '{id}' timed out after {timeout:?}")]
    RpcTimeout {
        id: String,
        method: String,
        timeout: Duration,
    },

    #[error("Method '{method}' on plugin '{id}' panicked: {message}")]
    RpcInternalError {
        id: String,
        method: String,
        message: String,
    },

    #[error("Method '{method}' on plugin '{id}' failed: {message}")]
    RpcHandlerError {
        id: String,
        method: String,
        message: String,
    },

    #[error("Plugin '{id}' not found")]
    NotFound { id: String },

    #[error("Plugin '{id}' cannot {action} while {state}")]
    InvalidState {
        id: String,
        state: LifecycleState,
        action: &'static str,
    },

    #[error("Plugin '{id}' is disabled")]
    PluginDisabled { id: String },

    #[error("Failed to load plugin '{id}': {message}")]
    LoadFailed { id: String, message: String },

    #[error("Start of plugin '{id}' was cancelled")]
    Cancelled { id: String },

    #[error("Plugin '{plugin}' lacks capability for {action}")]
    CapabilityDenied { plugin: String, action: String },

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ManifestInvalid(_) => ErrorKind::ManifestInvalid,
            Self::DuplicateId { .. } => ErrorKind::DuplicateId,
            Self::DependencyMissing { .. } => ErrorKind::DependencyMissing,
            Self::DependencyCycle { .. } => ErrorKind::DependencyCycle,
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::StartTimeout { .. } => ErrorKind::StartTimeout,
            Self::StopTimeout { .. } => ErrorKind::StopTimeout,
            Self::PluginFault { .. } => ErrorKind::PluginFault,
            Self::PluginFailed { .. } => ErrorKind::PluginFailed,
            Self::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            Self::RouteNotFound { .. } => ErrorKind::RouteNotFound,
            Self::CameraNotFound { .. } => ErrorKind::CameraNotFound,
            Self::PluginNotRunning { .. } => ErrorKind::PluginNotRunning,
            Self::RpcTimeout { .. } => ErrorKind::RpcTimeout,
            Self::RpcInternalError { .. } => ErrorKind::RpcInternalError,
            Self::RpcHandlerError { .. } => ErrorKind::RpcHandlerError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::PluginDisabled { .. } => ErrorKind::PluginDisabled,
            Self::LoadFailed { .. } => ErrorKind::LoadFailed,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::CapabilityDenied { .. } => ErrorKind::CapabilityDenied,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub(crate) fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }
}

impl From<ManifestError> for ManagerError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::DuplicateId(id) => Self::DuplicateId { id },
            other => Self::ManifestInvalid(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RpcInternalError).unwrap();
        assert_eq!(json, "\"rpc_internal_error\"");
        assert_eq!(ErrorKind::EventDeliveryDropped.to_string(), "event_delivery_dropped");
    }

    #[test]
    fn test_display_as_str_agree_with_serde() {
        for kind in [
            ErrorKind::DependencyCycle,
            ErrorKind::StartTimeout,
            ErrorKind::PluginNotRunning,
            ErrorKind::Persistence,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
        }
    }

    #[test]
    fn test_dependency_errors_name_the_plugins() {
        let err = ManagerError::DependencyMissing {
            id: "analytics".into(),
            missing: vec!["streaming".into(), "storage".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("analytics"));
        assert!(msg.contains("streaming, storage"));
        assert_eq!(err.kind(), ErrorKind::DependencyMissing);

        let err = ManagerError::DependencyCycle {
            id: "a".into(),
            members: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("a -> b"));
    }

    #[test]
    fn test_timeout_display() {
        let err = ManagerError::StartTimeout {
            id: "slow".into(),
            phase: "start",
            timeout: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("slow"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn test_not_running_shows_state() {
        let err = ManagerError::PluginNotRunning {
            id: "onvif".into(),
            state: LifecycleState::Stopped,
        };
        assert!(err.to_string().contains("stopped"));
        assert_eq!(err.kind(), ErrorKind::PluginNotRunning);
    }

    #[test]
    fn test_route_and_camera_errors() {
        let err = ManagerError::RouteNotFound {
            id: "zones".into(),
            route: "GET /zones/x".into(),
        };
        assert!(err.to_string().contains("GET /zones/x"));
        assert_eq!(err.kind().as_str(), "route_not_found");

        let err = ManagerError::CameraNotFound {
            camera_id: "porch".into(),
        };
        assert!(err.to_string().contains("porch"));
        assert_eq!(err.kind(), ErrorKind::CameraNotFound);
    }

    #[test]
    fn test_manifest_duplicate_maps_to_duplicate_id() {
        let err: ManagerError = ManifestError::DuplicateId("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::DuplicateId);

        let err: ManagerError = ManifestError::Invalid("empty id".into()).into();
        assert_eq!(err.kind(), ErrorKind::ManifestInvalid);
    }
}
