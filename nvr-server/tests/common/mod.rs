//! Shared test utilities for nvr-server integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use nvr_core::{ManagerConfig, MemoryStore, PluginManager};
use nvr_plugin_api::{
    Camera, CameraPlugin, Capability, Event, HttpMethod, Plugin, PluginError, PluginKind,
    PluginManifest, PluginRuntime, PtzCommand, RouteResponse, ServicePlugin, route_handler,
    rpc_handler,
};
use nvr_server::{AppState, NvrServer, create_router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Minimal service plugin exposing `echo`, `boom` and `emit`
#[derive(Default)]
pub struct EchoPlugin {
    runtime: Option<PluginRuntime>,
}

fn explode() -> Result<Value, PluginError> {
    panic!("boom")
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("echo", "Echo", "1.0.0")
            .critical()
            .with_capability(Capability::Motion)
            .with_capability(Capability::Rpc)
            .with_capability(Capability::HttpRoutes)
    }

    async fn initialize(&mut self, runtime: PluginRuntime) -> Result<(), PluginError> {
        self.runtime = Some(runtime);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| PluginError::custom("not initialized"))?;
        runtime.register_method("echo", rpc_handler(|params| async move { Ok(params) }))?;
        runtime.register_method(
            "boom",
            rpc_handler(|_| async move { explode() }),
        )?;
        let publisher = runtime.clone();
        runtime.register_method(
            "emit",
            rpc_handler(move |params: Value| {
                let publisher = publisher.clone();
                async move {
                    let camera = params["camera"].as_str().unwrap_or("front-door").to_string();
                    let report = publisher.publish(Event::new("motion").with_camera(camera))?;
                    Ok(json!({ "delivered": report.delivered }))
                }
            }),
        )?;
        runtime.register_route(
            HttpMethod::Get,
            "/greet/:name",
            route_handler(|request| async move {
                let name = request.params.get("name").cloned().unwrap_or_default();
                let punct = request.query.get("punct").cloned().unwrap_or_default();
                Ok(RouteResponse::text(200, format!("hello {name}{punct}")))
            }),
        )?;
        runtime.register_route(
            HttpMethod::Post,
            "/echo",
            route_handler(|request| async move {
                let body: Value = request.json()?;
                RouteResponse::json(201, &body)
            }),
        )?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

impl ServicePlugin for EchoPlugin {}

/// Camera plugin managing one PTZ camera, `porch`
#[derive(Default)]
pub struct PtzCameraPlugin {
    pub commands: Arc<Mutex<Vec<PtzCommand>>>,
}

#[async_trait]
impl Plugin for PtzCameraPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("porch-cam", "Porch camera", "1.0.0")
            .with_capability(Capability::Camera)
            .with_capability(Capability::Ptz)
    }

    async fn initialize(&mut self, _runtime: PluginRuntime) -> Result<(), PluginError> {
        Ok(())
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

#[async_trait]
impl CameraPlugin for PtzCameraPlugin {
    async fn discover_cameras(&mut self) -> Result<Vec<Camera>, PluginError> {
        Ok(self.cameras())
    }

    fn cameras(&self) -> Vec<Camera> {
        vec![Camera {
            id: "porch".into(),
            name: "Porch".into(),
            model: None,
            stream_url: None,
            online: true,
            has_ptz: true,
        }]
    }

    async fn ptz(&self, _camera_id: &str, command: &PtzCommand) -> Result<(), PluginError> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

pub fn test_manager() -> PluginManager {
    let config = ManagerConfig {
        start_timeout: Duration::from_secs(1),
        stop_timeout: Duration::from_secs(1),
        rpc_timeout: Duration::from_millis(500),
        ..ManagerConfig::default()
    };
    PluginManager::new(config, Arc::new(MemoryStore::new()))
}

pub async fn manager_with_echo() -> PluginManager {
    let manager = test_manager();
    manager
        .register_builtin(|| PluginKind::Service(Box::new(EchoPlugin::default())))
        .await
        .unwrap();
    manager
}

pub async fn test_server() -> (TestServer, PluginManager) {
    let manager = manager_with_echo().await;
    let router = create_router(Arc::new(AppState::new(manager.clone())));
    (TestServer::new(router).unwrap(), manager)
}

/// Spawns a real server in the background, returns its address
pub async fn spawn_server(manager: PluginManager) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = NvrServer::new(Default::default(), manager);
    tokio::spawn(async move {
        server
            .serve(listener, std::future::pending())
            .await
            .unwrap();
    });
    addr
}
