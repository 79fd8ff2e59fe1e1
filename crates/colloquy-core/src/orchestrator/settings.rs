//! Orchestrator settings
//!
//! Derived from the [`ConfigProvider`] during the core-systems phase. Missing
//! keys fall back to defaults; malformed values are fatal.

use crate::config::ConfigProvider;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineSettings, QueueMode};
use std::time::Duration;

/// Default broadcast tap capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Settings for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Application name (`app.name`)
    pub app_name: String,
    /// Deployment environment (`app.environment`)
    pub environment: String,
    /// Debug mode (`app.debug`)
    pub debug: bool,
    /// Message pipeline tuning (`pipeline.*`)
    pub pipeline: PipelineSettings,
    /// Period of background health checks; `None` disables them
    pub health_check_interval: Option<Duration>,
    /// Include the backend in health reports
    pub check_api_health: bool,
    /// Broadcast tap capacity (`events.capacity`)
    pub event_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            app_name: "colloquy".to_string(),
            environment: "development".to_string(),
            debug: false,
            pipeline: PipelineSettings::default(),
            health_check_interval: None,
            check_api_health: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl OrchestratorSettings {
    /// Read settings from `config`.
    pub fn from_config(config: &dyn ConfigProvider) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(name) = non_empty(config, "app.name")? {
            settings.app_name = name;
        }
        if let Some(environment) = non_empty(config, "app.environment")? {
            settings.environment = environment;
        }
        if let Some(debug) = config.get_bool("app.debug")? {
            settings.debug = debug;
        }

        if let Some(mode) = config.get_str("pipeline.queue_mode")? {
            settings.pipeline.queue_mode = mode.parse::<QueueMode>()?;
        }
        settings.pipeline.request_timeout = config
            .get_u64("pipeline.request_timeout_ms")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        settings.health_check_interval = config
            .get_u64("system.health_check_interval_secs")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(check) = config.get_bool("system.check_api_health")? {
            settings.check_api_health = check;
        }

        if let Some(capacity) = config.get_u64("events.capacity")? {
            settings.event_capacity = usize::try_from(capacity)
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| Error::config("events.capacity", "must be greater than zero"))?;
        }

        Ok(settings)
    }
}

fn non_empty(config: &dyn ConfigProvider, key: &str) -> Result<Option<String>> {
    match config.get_str(key)? {
        Some(value) if value.trim().is_empty() => Err(Error::config(key, "must not be empty")),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonConfig;

    #[test]
    fn test_defaults_when_unset() {
        let settings = OrchestratorSettings::from_config(&JsonConfig::empty()).unwrap();
        assert_eq!(settings, OrchestratorSettings::default());
        assert_eq!(settings.pipeline.queue_mode, QueueMode::Concurrent);
        assert!(settings.health_check_interval.is_none());
    }

    #[test]
    fn test_reads_every_key() {
        let config = JsonConfig::empty()
            .with("app.name", "asystent")
            .with("app.environment", "production")
            .with("app.debug", true)
            .with("pipeline.queue_mode", "sequential")
            .with("pipeline.request_timeout_ms", 1500)
            .with("system.health_check_interval_secs", "30")
            .with("system.check_api_health", true)
            .with("events.capacity", 64);

        let settings = OrchestratorSettings::from_config(&config).unwrap();
        assert_eq!(settings.app_name, "asystent");
        assert_eq!(settings.environment, "production");
        assert!(settings.debug);
        assert_eq!(settings.pipeline.queue_mode, QueueMode::Sequential);
        assert_eq!(settings.pipeline.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(settings.health_check_interval, Some(Duration::from_secs(30)));
        assert!(settings.check_api_health);
        assert_eq!(settings.event_capacity, 64);
    }

    #[test]
    fn test_zero_disables_timeout_and_health_timer() {
        let config = JsonConfig::empty()
            .with("pipeline.request_timeout_ms", 0)
            .with("system.health_check_interval_secs", 0);

        let settings = OrchestratorSettings::from_config(&config).unwrap();
        assert!(settings.pipeline.request_timeout.is_none());
        assert!(settings.health_check_interval.is_none());
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for config in [
            JsonConfig::empty().with("events.capacity", 0),
            JsonConfig::empty().with("pipeline.queue_mode", "burst"),
            JsonConfig::empty().with("app.name", "  "),
            JsonConfig::empty().with("app.debug", "sometimes"),
        ] {
            let err = OrchestratorSettings::from_config(&config).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig { .. }), "got: {err}");
        }
    }
}
