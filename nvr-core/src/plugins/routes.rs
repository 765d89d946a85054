//! HTTP route table for plugin-mounted routes

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use nvr_plugin_api::{HttpMethod, PluginError, RouteHandler, RouteRegistrar};

/// Path pattern with `:param` segments
struct PathMatcher {
    segments: Vec<PathSegment>,
}

enum PathSegment {
    Literal(String),
    Param(String),
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PathMatcher {
    fn new(path: &str) -> Self {
        let segments = split(path)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                PathSegment::Literal(expected) if expected != part => return None,
                PathSegment::Literal(_) => {}
                PathSegment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }

    /// Same shape as `other`, ignoring parameter names
    fn overlaps(&self, other: &PathMatcher) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (PathSegment::Literal(a), PathSegment::Literal(b)) => a == b,
                    (PathSegment::Param(_), PathSegment::Param(_)) => true,
                    _ => false,
                })
    }
}

struct PluginRoute {
    method: HttpMethod,
    path: String,
    matcher: PathMatcher,
    handler: RouteHandler,
}

/// Routes registered by running plugins, keyed by plugin.
///
/// Paths are relative to the plugin's mount point, so plugins never
/// conflict with each other.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<String, Vec<PluginRoute>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        plugin_id: &str,
        method: HttpMethod,
        path: &str,
        handler: RouteHandler,
    ) -> Result<(), PluginError> {
        let matcher = PathMatcher::new(path);
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let plugin_routes = routes.entry(plugin_id.to_string()).or_default();
        if plugin_routes
            .iter()
            .any(|r| r.method == method && r.matcher.overlaps(&matcher))
        {
            return Err(PluginError::DuplicateRoute(format!("{plugin_id}: {method} {path}")));
        }
        plugin_routes.push(PluginRoute {
            method,
            path: path.to_string(),
            matcher,
            handler,
        });
        tracing::debug!(plugin = %plugin_id, method = %method, path = %path, "Registered HTTP route");
        Ok(())
    }

    /// Find the handler for `method` and `path` under a plugin's prefix,
    /// with the extracted path parameters
    pub fn match_route(
        &self,
        plugin_id: &str,
        method: HttpMethod,
        path: &str,
    ) -> Option<(RouteHandler, HashMap<String, String>)> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes.get(plugin_id)?.iter().find_map(|route| {
            if route.method != method {
                return None;
            }
            route
                .matcher
                .match_path(path)
                .map(|params| (route.handler.clone(), params))
        })
    }

    /// Drop every route of a plugin. Returns how many were removed.
    pub fn unregister_plugin(&self, plugin_id: &str) -> usize {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(plugin_id)
            .map(|routes| routes.len())
            .unwrap_or(0)
    }

    /// `"METHOD /path"` of each route of a plugin, in registration order
    pub fn routes(&self, plugin_id: &str) -> Vec<String> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin_id)
            .map(|routes| {
                routes
                    .iter()
                    .map(|r| format!("{} {}", r.method, r.path))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RouteRegistrar for RouteTable {
    fn register_route(
        &self,
        plugin_id: &str,
        method: HttpMethod,
        path: &str,
        handler: RouteHandler,
    ) -> Result<(), PluginError> {
        self.register(plugin_id, method, path, handler)
    }
}
