//! Plugin metadata and the value types plugins exchange with the host

use serde::{Deserialize, Deserializer, Serialize};

use crate::capability::Capability;

/// Plugin manifest, read from `manifest.yaml` (or `.json`) in the plugin
/// directory, or returned by a compiled-in plugin.
///
/// Immutable once loaded. Missing or null lists deserialize as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin id
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// API version this plugin was built against
    #[serde(default = "default_api_version")]
    pub api_version: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// A critical plugin that is not running degrades system readiness
    #[serde(default)]
    pub critical: bool,
    /// Ids that must be running before this plugin starts
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

fn default_api_version() -> u32 {
    crate::API_VERSION
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            version: "0.0.1".to_string(),
            api_version: crate::API_VERSION,
            description: String::new(),
            category: String::new(),
            critical: false,
            dependencies: Vec::new(),
            capabilities: Vec::new(),
            author: None,
            homepage: None,
            license: None,
        }
    }
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A camera known to a camera plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub has_ptz: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzAction {
    Move,
    Stop,
    Zoom,
    Preset,
}

/// A pan/tilt/zoom command for a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzCommand {
    pub action: PtzAction,
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub tilt: f64,
    #[serde(default)]
    pub zoom: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<u32>,
}

impl PtzCommand {
    pub fn new(action: PtzAction) -> Self {
        Self {
            action,
            pan: 0.0,
            tilt: 0.0,
            zoom: 0.0,
            speed: 0.0,
            preset_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// A notification handed to notification plugins for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<uuid::Uuid>,
}
