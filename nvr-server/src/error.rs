//! Server error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nvr_core::{ErrorKind, ManagerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that stop the server itself
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body: `{"kind": "...", "message": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// A request that failed
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                kind: "invalid_request".to_string(),
                message: message.into(),
            },
        }
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    use ErrorKind::*;
    match kind {
        NotFound | MethodNotFound | RouteNotFound | CameraNotFound => StatusCode::NOT_FOUND,
        ManifestInvalid => StatusCode::BAD_REQUEST,
        DuplicateId | InvalidState | PluginNotRunning | PluginDisabled | DependencyMissing
        | DependencyCycle | DependencyUnavailable | Cancelled => StatusCode::CONFLICT,
        CapabilityDenied => StatusCode::FORBIDDEN,
        RpcHandlerError => StatusCode::UNPROCESSABLE_ENTITY,
        StartTimeout | StopTimeout | RpcTimeout => StatusCode::GATEWAY_TIMEOUT,
        PluginFault | PluginFailed | RpcInternalError | LoadFailed | Persistence
        | EventDeliveryDropped => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            body: ErrorBody {
                kind: kind.as_str().to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(kind = %self.body.kind, message = %self.body.message, "Request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
