//! HTTP types for plugin route registration

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::PluginError;

/// HTTP method for route registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Parse an upper- or lower-case method name
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incoming HTTP request passed to a plugin route handler
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Path parameters extracted from the route pattern (`:id` -> "123")
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RouteRequest {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        serde_json::from_slice(&self.body).map_err(|e| PluginError::invalid_input(e.to_string()))
    }
}

/// HTTP response from a plugin route handler
#[derive(Debug, Clone)]
pub struct RouteResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
}

impl RouteResponse {
    /// Create a JSON response
    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self, PluginError> {
        Ok(Self {
            status,
            body: serde_json::to_vec(data)?,
            content_type: "application/json".to_string(),
        })
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            body: text.into().into_bytes(),
            content_type: "text/plain".to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_type: "application/json".to_string(),
        }
    }
}

/// Future returned by a route handler.
pub type RouteFuture = BoxFuture<'static, Result<RouteResponse, PluginError>>;

/// A plugin-defined HTTP route handler.
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> RouteFuture + Send + Sync>;

/// Wrap an async closure as a [`RouteHandler`].
pub fn route_handler<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RouteResponse, PluginError>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// Host side of HTTP route registration.
///
/// `path` is relative to the plugin's mount point and may contain `:param`
/// segments.
pub trait RouteRegistrar: Send + Sync {
    fn register_route(
        &self,
        plugin_id: &str,
        method: HttpMethod,
        path: &str,
        handler: RouteHandler,
    ) -> Result<(), PluginError>;
}
