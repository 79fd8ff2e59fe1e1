//! Read-only configuration lookup
//!
//! The core never loads configuration itself; the process entry point hands
//! it a [`ConfigProvider`]. Keys are dotted paths (`pipeline.queue_mode`).

use crate::error::{Error, Result};
use serde_json::Value;

/// Read-only feature-flag/config lookup.
pub trait ConfigProvider: Send + Sync {
    /// Raw value for `key`, if present.
    fn get(&self, key: &str) -> Option<Value>;

    /// String value for `key`. Non-string values are an error.
    fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::config(key, format!("expected a string, got {other}"))),
        }
    }

    /// Boolean value for `key`. Accepts `"true"`/`"false"` strings, as
    /// environment overrides arrive as text.
    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) => s
                .trim()
                .parse::<bool>()
                .map(Some)
                .map_err(|_| Error::config(key, format!("expected a boolean, got '{s}'"))),
            Some(other) => Err(Error::config(key, format!("expected a boolean, got {other}"))),
        }
    }

    /// Unsigned integer value for `key`. Accepts numeric strings.
    fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| Error::config(key, format!("expected a non-negative integer, got {n}"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::config(key, format!("expected a non-negative integer, got '{s}'"))),
            Some(other) => Err(Error::config(
                key,
                format!("expected a non-negative integer, got {other}"),
            )),
        }
    }

    /// Whether a feature flag is on, defaulting to `default` when unset.
    ///
    /// Malformed values count as unset.
    fn is_enabled(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).ok().flatten().unwrap_or(default)
    }
}

/// Configuration backed by a JSON tree.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    root: Value,
}

impl JsonConfig {
    /// Wrap a JSON document.
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Configuration with no keys; every lookup falls back to defaults.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Serialize any config struct into a provider.
    pub fn from_serializable<T: serde::Serialize>(config: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(config)?))
    }

    /// Set `key`, creating intermediate objects.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let mut node = &mut self.root;
        for segment in key.split('.') {
            if !node.is_object() {
                *node = Value::Object(serde_json::Map::new());
            }
            node = match node {
                Value::Object(map) => map.entry(segment).or_insert(Value::Null),
                _ => unreachable!("node was just made an object"),
            };
        }
        *node = value.into();
        self
    }
}

impl ConfigProvider for JsonConfig {
    fn get(&self, key: &str) -> Option<Value> {
        key.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_lookup() {
        let config = JsonConfig::new(json!({
            "pipeline": { "queue_mode": "sequential", "request_timeout_ms": 1500 }
        }));

        assert_eq!(
            config.get_str("pipeline.queue_mode").unwrap().as_deref(),
            Some("sequential")
        );
        assert_eq!(config.get_u64("pipeline.request_timeout_ms").unwrap(), Some(1500));
        assert_eq!(config.get("pipeline.missing"), None);
    }

    #[test]
    fn test_builder_and_string_coercion() {
        let config = JsonConfig::empty()
            .with("app.debug", "true")
            .with("system.health_check_interval_secs", "30");

        assert_eq!(config.get_bool("app.debug").unwrap(), Some(true));
        assert_eq!(
            config.get_u64("system.health_check_interval_secs").unwrap(),
            Some(30)
        );
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let config = JsonConfig::empty()
            .with("app.name", 7)
            .with("app.debug", "maybe")
            .with("pipeline.request_timeout_ms", -5);

        assert!(matches!(
            config.get_str("app.name"),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(config.get_bool("app.debug").is_err());
        assert!(config.get_u64("pipeline.request_timeout_ms").is_err());
    }

    #[test]
    fn test_is_enabled_defaults() {
        let config = JsonConfig::empty()
            .with("modules.typing", false)
            .with("modules.broken", "nope");

        assert!(!config.is_enabled("modules.typing", true));
        assert!(config.is_enabled("modules.transcript", true));
        assert!(config.is_enabled("modules.broken", true));
    }
}
