//! Events routed by the host event bus

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::PluginError;

/// Well-known event types.
///
/// Event types are dotted strings; the segment before the first dot is the
/// namespace a capability grants access to.
pub mod types {
    pub const DETECTION: &str = "detection";
    pub const DETECTION_ENDED: &str = "detection.ended";
    pub const MOTION: &str = "motion";
    pub const MOTION_ENDED: &str = "motion.ended";
    pub const CAMERA_ADDED: &str = "camera.added";
    pub const CAMERA_REMOVED: &str = "camera.removed";
    pub const CAMERA_UPDATED: &str = "camera.updated";
    pub const CAMERA_ONLINE: &str = "camera.online";
    pub const CAMERA_OFFLINE: &str = "camera.offline";
    pub const RECORDING_STARTED: &str = "recording.started";
    pub const RECORDING_STOPPED: &str = "recording.stopped";
    pub const CONFIG_CHANGED: &str = "config.changed";
    pub const PLUGIN_STARTED: &str = "plugin.started";
    pub const PLUGIN_STOPPED: &str = "plugin.stopped";
    pub const PLUGIN_ERROR: &str = "plugin.error";
    pub const PLUGIN_HEALTH: &str = "plugin.health";
}

/// An immutable event.
///
/// `source_plugin` is `None` for events raised by the host itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_plugin: Option<String>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            camera_id: None,
            timestamp: Utc::now(),
            payload: Map::new(),
            source_plugin: None,
        }
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn from_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.source_plugin = Some(plugin_id.into());
        self
    }

    /// Namespace of this event's type (`camera` for `camera.added`).
    pub fn namespace(&self) -> &str {
        namespace_of(&self.event_type)
    }
}

pub(crate) fn namespace_of(event_type: &str) -> &str {
    event_type.split('.').next().unwrap_or(event_type)
}

/// A subscription pattern over event types.
///
/// `*` matches everything, `camera.*` matches `camera` and every
/// `camera.<x>` type, anything else matches one exact type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPattern {
    All,
    Namespace(String),
    Exact(String),
}

impl EventPattern {
    pub fn parse(pattern: &str) -> Result<Self, PluginError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PluginError::invalid_input("empty event pattern"));
        }
        if pattern == "*" {
            return Ok(Self::All);
        }
        if let Some(ns) = pattern.strip_suffix(".*") {
            if ns.is_empty() || ns.contains('*') {
                return Err(PluginError::invalid_input(format!(
                    "invalid event pattern '{pattern}'"
                )));
            }
            return Ok(Self::Namespace(ns.to_string()));
        }
        if pattern.contains('*') {
            return Err(PluginError::invalid_input(format!(
                "invalid event pattern '{pattern}'"
            )));
        }
        Ok(Self::Exact(pattern.to_string()))
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(t) => t == event_type,
            Self::Namespace(ns) => {
                event_type == ns
                    || (event_type.len() > ns.len()
                        && event_type.starts_with(ns.as_str())
                        && event_type.as_bytes()[ns.len()] == b'.')
            }
        }
    }

    /// The namespace this pattern is confined to, `None` for `*`.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Namespace(ns) => Some(ns),
            Self::Exact(t) => Some(namespace_of(t)),
        }
    }
}

impl FromStr for EventPattern {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Namespace(ns) => write!(f, "{ns}.*"),
            Self::Exact(t) => f.write_str(t),
        }
    }
}

/// Outcome of a single publish.
///
/// Drops are not errors; they are counted here and by the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}
