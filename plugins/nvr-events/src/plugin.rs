//! EventArchivePlugin - the `event-archive` service plugin

use std::sync::Arc;

use async_trait::async_trait;
use nvr_plugin_api::{
    Capability, Event, HealthStatus, Plugin, PluginConfig, PluginError, PluginManifest, PluginRuntime,
    ServicePlugin, rpc_handler,
};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::archive::{DEFAULT_MAX_EVENTS, EventArchive, RecentQuery};

pub const PLUGIN_ID: &str = "event-archive";

/// Subscriptions used unless `event_types` is configured
pub const DEFAULT_PATTERNS: &[&str] = &["detection.*", "motion.*", "camera.*"];

/// Archives detection, motion and camera events.
///
/// Configuration:
/// - `max_events` (default 10000): retention cap
/// - `event_types`: subscription patterns, within the declared capabilities
#[derive(Default)]
pub struct EventArchivePlugin {
    runtime: Option<PluginRuntime>,
    archive: Option<Arc<EventArchive>>,
    writer: Option<JoinHandle<()>>,
}

fn max_events(config: &PluginConfig) -> usize {
    usize::try_from(config.get_i64("max_events", DEFAULT_MAX_EVENTS as i64))
        .unwrap_or(1)
        .max(1)
}

fn parse_params<T: serde::de::DeserializeOwned + Default>(params: Value) -> Result<T, PluginError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|e| PluginError::invalid_input(e.to_string()))
}

async fn archive_event(archive: &EventArchive, runtime: &PluginRuntime, event: Arc<Event>) {
    if let Err(e) = archive.record(event).await {
        runtime.log_warn(&format!("Failed to persist event: {e}"));
        runtime.set_degraded("archive writes failing");
    }
}

impl EventArchivePlugin {
    fn parts(&self) -> Result<(PluginRuntime, Arc<EventArchive>), PluginError> {
        match (&self.runtime, &self.archive) {
            (Some(runtime), Some(archive)) => Ok((runtime.clone(), archive.clone())),
            _ => Err(PluginError::custom("event archive not initialized")),
        }
    }
}

#[async_trait]
impl Plugin for EventArchivePlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            description: "Keeps a bounded history of detection, motion and camera events"
                .to_string(),
            ..PluginManifest::new(PLUGIN_ID, "Event Archive", env!("CARGO_PKG_VERSION"))
                .with_category("storage")
                .with_capability(Capability::Detection)
                .with_capability(Capability::Motion)
                .with_capability(Capability::Camera)
                .with_capability(Capability::Rpc)
        }
    }

    async fn initialize(&mut self, runtime: PluginRuntime) -> Result<(), PluginError> {
        let archive = Arc::new(EventArchive::new(runtime.store(), max_events(runtime.config())));
        let loaded = archive.load().await?;
        runtime.log_info(&format!("Loaded {loaded} archived events"));
        self.archive = Some(archive);
        self.runtime = Some(runtime);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        let (runtime, archive) = self.parts()?;

        let patterns: Vec<String> = runtime
            .config_get("event_types")
            .unwrap_or_else(|| DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect());
        let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
        let mut rx = runtime.subscribe(&patterns)?;

        let writer_archive = archive.clone();
        let writer_runtime = runtime.clone();
        self.writer = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                archive_event(&writer_archive, &writer_runtime, event).await;
            }
            // events handed over before the subscription ended
            for event in rx.drain() {
                archive_event(&writer_archive, &writer_runtime, event).await;
            }
        }));

        let recent = archive.clone();
        runtime.register_method(
            "recent",
            rpc_handler(move |params| {
                let archive = recent.clone();
                async move {
                    let query: RecentQuery = parse_params(params)?;
                    Ok(serde_json::to_value(archive.recent(&query))?)
                }
            }),
        )?;

        let counts = archive.clone();
        runtime.register_method(
            "count",
            rpc_handler(move |_| {
                let archive = counts.clone();
                async move { Ok(serde_json::to_value(archive.counts())?) }
            }),
        )?;

        runtime.set_healthy(format!("{} events archived", archive.len()));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        // the receiver ends once the runtime's shutdown token fires,
        // then the writer records what was still queued
        if let Some(writer) = self.writer.take()
            && let Err(e) = writer.await
        {
            tracing::warn!(plugin = PLUGIN_ID, error = %e, "Archive writer ended abnormally");
        }
        Ok(())
    }

    async fn health_check(&self) -> Option<HealthStatus> {
        let archive = self.archive.as_ref()?;
        let counts = archive.counts();
        let status = if counts.write_failures > 0 {
            HealthStatus::degraded(format!(
                "{} events archived, {} store writes failed",
                counts.total, counts.write_failures
            ))
        } else {
            HealthStatus::healthy(format!("{} events archived", counts.total))
        };
        Some(status)
    }
}

#[async_trait]
impl ServicePlugin for EventArchivePlugin {
    async fn on_config_change(&mut self, config: &PluginConfig) -> Result<(), PluginError> {
        if let Some(archive) = &self.archive {
            archive.set_max_events(max_events(config)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_declares_event_namespaces_and_rpc() {
        let manifest = EventArchivePlugin::default().manifest();
        assert_eq!(manifest.id, PLUGIN_ID);
        assert!(!manifest.critical);
        for cap in [
            Capability::Detection,
            Capability::Motion,
            Capability::Camera,
            Capability::Rpc,
        ] {
            assert!(manifest.has_capability(&cap));
        }
        assert!(!manifest.has_capability(&Capability::Events));
    }

    #[test]
    fn max_events_defaults_and_clamps() {
        assert_eq!(max_events(&PluginConfig::new()), DEFAULT_MAX_EVENTS);
        let mut config = PluginConfig::new();
        config.set("max_events", 0).unwrap();
        assert_eq!(max_events(&config), 1);
        config.set("max_events", -5).unwrap();
        assert_eq!(max_events(&config), 1);
        config.set("max_events", 250).unwrap();
        assert_eq!(max_events(&config), 250);
    }

    #[tokio::test]
    async fn start_before_initialize_fails() {
        let mut plugin = EventArchivePlugin::default();
        assert!(plugin.start().await.is_err());
        assert!(plugin.health_check().await.is_none());
    }
}
