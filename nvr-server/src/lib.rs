//! nvr-server - management API and live event streams for the nvr daemon
//!
//! The server owns nothing but a [`PluginManager`] handle; every route is a
//! thin wrapper around a manager operation.

mod error;
pub mod http;
mod state;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use nvr_core::PluginManager;
use nvr_core::config::ServerConfig;
use tokio::net::TcpListener;

pub use error::{ApiError, ErrorBody, ServerError, status_for};
pub use http::create_router;
pub use state::AppState;

/// The nvr management server
pub struct NvrServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl NvrServer {
    pub fn new(config: ServerConfig, manager: PluginManager) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(manager)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        tracing::info!(addr = %local, "nvr server listening");

        let router = create_router(self.state);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
