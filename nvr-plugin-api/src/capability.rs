//! Capability tags declared in plugin manifests

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::EventPattern;

/// A capability a plugin declares in its manifest.
///
/// Capabilities bound what a plugin may do through its runtime: which event
/// namespaces it may publish or subscribe to, and whether it may expose RPC
/// methods. Unrecognized tags are kept as [`Capability::Custom`] and grant
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    /// Full event bus access (every namespace)
    Events,
    Camera,
    Detection,
    Motion,
    Recording,
    Streaming,
    Playback,
    Notifications,
    Config,
    Ptz,
    Audio,
    /// May register RPC methods callable through the management API
    Rpc,
    /// May mount HTTP routes under the management API
    HttpRoutes,
    Custom(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Events => "events",
            Self::Camera => "camera",
            Self::Detection => "detection",
            Self::Motion => "motion",
            Self::Recording => "recording",
            Self::Streaming => "streaming",
            Self::Playback => "playback",
            Self::Notifications => "notifications",
            Self::Config => "config",
            Self::Ptz => "ptz",
            Self::Audio => "audio",
            Self::Rpc => "rpc",
            Self::HttpRoutes => "http_routes",
            Self::Custom(tag) => tag,
        }
    }

    /// Event namespace this capability opens, if any.
    pub fn event_namespace(&self) -> Option<&'static str> {
        match self {
            Self::Camera => Some("camera"),
            Self::Detection => Some("detection"),
            Self::Motion => Some("motion"),
            Self::Recording => Some("recording"),
            Self::Streaming => Some("streaming"),
            Self::Playback => Some("playback"),
            Self::Notifications => Some("notification"),
            Self::Config => Some("config"),
            Self::Ptz => Some("ptz"),
            Self::Audio => Some("audio"),
            Self::Events | Self::Rpc | Self::HttpRoutes | Self::Custom(_) => None,
        }
    }
}

impl From<String> for Capability {
    fn from(tag: String) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "events" => Self::Events,
            "camera" => Self::Camera,
            "detection" => Self::Detection,
            "motion" => Self::Motion,
            "recording" => Self::Recording,
            "streaming" => Self::Streaming,
            "playback" => Self::Playback,
            "notifications" | "notification" => Self::Notifications,
            "config" => Self::Config,
            "ptz" => Self::Ptz,
            "audio" => Self::Audio,
            "rpc" => Self::Rpc,
            "http_routes" | "routes" => Self::HttpRoutes,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for Capability {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.as_str().to_string()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a set of capabilities covers every event type `pattern` can match.
pub fn permits(capabilities: &[Capability], pattern: &EventPattern) -> bool {
    if capabilities.contains(&Capability::Events) {
        return true;
    }
    match pattern.namespace() {
        None => false,
        Some(ns) => capabilities
            .iter()
            .any(|cap| cap.event_namespace() == Some(ns)),
    }
}
