//! HTTP server module

mod api;
mod plugin_routes;
mod stream;

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::ws;

pub use api::{EventStats, HealthResponse, LogsQuery, RpcResponse};
pub use stream::StreamQuery;

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/plugins", get(api::list_plugins))
        .route(
            "/api/plugins/:id",
            get(api::get_plugin).delete(api::uninstall_plugin),
        )
        .route("/api/plugins/:id/start", post(api::start_plugin))
        .route("/api/plugins/:id/stop", post(api::stop_plugin))
        .route("/api/plugins/:id/restart", post(api::restart_plugin))
        .route("/api/plugins/:id/enable", post(api::enable_plugin))
        .route("/api/plugins/:id/disable", post(api::disable_plugin))
        .route("/api/plugins/:id/health", post(api::check_plugin_health))
        .route("/api/plugins/:id/rpc", post(api::plugin_rpc))
        .route("/api/plugins/:id/logs", get(api::plugin_logs))
        .route(
            "/api/plugins/:id/config",
            get(api::get_plugin_config).put(api::put_plugin_config),
        )
        .route(
            "/api/plugins/:id/routes/*path",
            any(plugin_routes::plugin_route),
        )
        .route("/api/cameras", get(api::list_cameras))
        .route("/api/cameras/:id/ptz", post(plugin_routes::ptz_control))
        .route("/api/events/stats", get(api::event_stats))
        .route("/api/events/stream", get(stream::event_stream))
        .route("/ws/events", get(ws::events_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
