//! Per-plugin configuration blob

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::PluginError;

/// Plugin configuration: an opaque key-value map owned by the host.
///
/// The host loads it from the daemon config, the plugin directory and
/// persisted overrides, then hands a copy to the plugin at initialize time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginConfig {
    values: Map<String, Value>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Build from any JSON value; non-objects yield an empty config.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PluginError> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map_or_else(|| default.to_string(), str::to_string)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Overlay `other` on top of this config; keys in `other` win.
    pub fn merge(&mut self, other: &PluginConfig) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_get_set() {
        let mut config = PluginConfig::new();

        config.set("string_key", "hello").unwrap();
        config.set("int_key", 42i64).unwrap();
        config.set("bool_key", true).unwrap();

        assert_eq!(
            config.get::<String>("string_key"),
            Some("hello".to_string())
        );
        assert_eq!(config.get::<i64>("int_key"), Some(42));
        assert_eq!(config.get::<bool>("bool_key"), Some(true));
        assert_eq!(config.get::<String>("missing"), None);
    }

    #[test]
    fn test_typed_accessors_fall_back_to_defaults() {
        let config = PluginConfig::from_value(json!({
            "max_events": 500,
            "threshold": 0.75,
            "enabled": false,
            "name": "front"
        }));

        assert_eq!(config.get_i64("max_events", 10_000), 500);
        assert_eq!(config.get_i64("retention_days", 30), 30);
        assert_eq!(config.get_f64("threshold", 0.5), 0.75);
        assert!(!config.get_bool("enabled", true));
        assert_eq!(config.get_str("name", "x"), "front");
        // wrong type falls back too
        assert_eq!(config.get_i64("name", 7), 7);
    }

    #[test]
    fn test_non_object_value_is_empty() {
        assert!(PluginConfig::from_value(json!([1, 2])).is_empty());
    }

    #[test]
    fn test_merge_overrides_keys() {
        let mut base = PluginConfig::from_value(json!({"a": 1, "b": 2}));
        base.merge(&PluginConfig::from_value(json!({"b": 3, "c": 4})));
        assert_eq!(base.to_value(), json!({"a": 1, "b": 3, "c": 4}));
    }
}
