//! Plugin HTTP routes and PTZ control

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use nvr_plugin_api::{HttpMethod, PtzCommand, RouteRequest};

use crate::AppState;
use crate::error::ApiError;

/// Convert axum Method to plugin HttpMethod
fn to_http_method(method: &Method) -> Option<HttpMethod> {
    match *method {
        Method::GET => Some(HttpMethod::Get),
        Method::POST => Some(HttpMethod::Post),
        Method::PUT => Some(HttpMethod::Put),
        Method::DELETE => Some(HttpMethod::Delete),
        Method::PATCH => Some(HttpMethod::Patch),
        _ => None,
    }
}

/// Forward `/api/plugins/{id}/routes/{path}` to the plugin's route table
pub async fn plugin_route(
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(method) = to_http_method(&method) else {
        return Ok((StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response());
    };

    let request = RouteRequest {
        params: HashMap::new(),
        query,
        body: body.to_vec(),
    };
    let path = format!("/{}", path.trim_start_matches('/'));
    let resp = state
        .manager
        .dispatch_route(&id, method, &path, request)
        .await?;

    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((
        status,
        [(header::CONTENT_TYPE, resp.content_type)],
        Body::from(resp.body),
    )
        .into_response())
}

pub async fn ptz_control(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<String>,
    Json(command): Json<PtzCommand>,
) -> Result<StatusCode, ApiError> {
    state.manager.ptz_control(&camera_id, &command).await?;
    Ok(StatusCode::NO_CONTENT)
}
