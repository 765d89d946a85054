//! REST API handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use nvr_core::events::{BusStats, ClientStats};
use nvr_core::plugins::RpcRequest;
use nvr_core::{PluginStatus, SystemHealth};
use nvr_plugin_api::{Camera, HealthStatus, LogEntry, PluginConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use crate::error::ApiError;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub version: String,
    pub uptime_seconds: i64,
    #[serde(flatten)]
    pub system: SystemHealth,
}

/// Aggregate system health plus per-plugin detail
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        system: state.manager.system_health(),
    })
}

pub async fn list_plugins(State(state): State<Arc<AppState>>) -> Json<Vec<PluginStatus>> {
    Json(state.manager.list())
}

pub async fn get_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<PluginStatus> {
    Ok(Json(state.manager.status(&id)?))
}

pub async fn start_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<PluginStatus> {
    state.manager.start(&id).await?;
    Ok(Json(state.manager.status(&id)?))
}

pub async fn stop_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<PluginStatus> {
    state.manager.stop(&id).await?;
    Ok(Json(state.manager.status(&id)?))
}

pub async fn restart_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<PluginStatus> {
    state.manager.restart(&id).await?;
    Ok(Json(state.manager.status(&id)?))
}

pub async fn enable_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<PluginStatus> {
    state.manager.enable(&id).await?;
    Ok(Json(state.manager.status(&id)?))
}

pub async fn disable_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<PluginStatus> {
    state.manager.disable(&id).await?;
    Ok(Json(state.manager.status(&id)?))
}

pub async fn uninstall_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.manager.uninstall(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check the plugin now instead of waiting for the next poll
pub async fn check_plugin_health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<HealthStatus> {
    Ok(Json(state.manager.check_health(&id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: Value,
}

pub async fn plugin_rpc(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RpcRequest>,
) -> ApiResult<RpcResponse> {
    let result = state
        .manager
        .route_rpc(&id, &request.method, request.params)
        .await?;
    Ok(Json(RpcResponse { result }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

fn default_log_limit() -> usize {
    100
}

pub async fn plugin_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Vec<LogEntry>> {
    Ok(Json(state.manager.plugin_logs(&id, query.limit)?))
}

pub async fn get_plugin_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    Ok(Json(state.manager.plugin_config(&id)?.to_value()))
}

/// Replace the plugin's override config; returns the effective config
pub async fn put_plugin_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    let Value::Object(map) = body else {
        return Err(ApiError::bad_request("config must be a JSON object"));
    };
    let effective = state
        .manager
        .update_config(&id, PluginConfig::from_map(map))
        .await?;
    Ok(Json(effective.to_value()))
}

pub async fn list_cameras(State(state): State<Arc<AppState>>) -> Json<Vec<Camera>> {
    Json(state.manager.cameras())
}

#[derive(Debug, Serialize)]
pub struct EventStats {
    pub bus: BusStats,
    pub clients: Vec<ClientStats>,
}

pub async fn event_stats(State(state): State<Arc<AppState>>) -> Json<EventStats> {
    Json(EventStats {
        bus: state.manager.bus().stats(),
        clients: state.manager.fanout().client_stats(),
    })
}
