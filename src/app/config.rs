//! Application configuration types

use anyhow::{Context, Result};
use colloquy_api::ApiConfig;
use colloquy_core::JsonConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub system: SystemSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub typing: TypingSection,
    /// Module enable flags by name
    #[serde(default)]
    pub modules: BTreeMap<String, bool>,
    /// Service enable flags by name
    #[serde(default)]
    pub services: BTreeMap<String, bool>,
}

impl AppConfig {
    /// Configuration view handed to the core.
    pub fn to_provider(&self) -> Result<JsonConfig> {
        JsonConfig::from_serializable(self).context("Failed to convert configuration")
    }

    /// Transport settings
    pub fn api_config(&self) -> ApiConfig {
        let config = ApiConfig::new()
            .with_base_url(&self.api.base_url)
            .with_timeout(Duration::from_secs(self.api.timeout_secs.max(1)));
        match &self.api.api_key {
            Some(key) if !key.is_empty() => config.with_api_key(key),
            _ => config,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub debug: bool,
}

fn default_app_name() -> String {
    "colloquy".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_environment(),
            debug: false,
        }
    }
}

/// Logging configuration (`RUST_LOG` takes precedence over `filter`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "colloquy=info,colloquy_core=info,colloquy_api=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
    /// Never forwarded to the core configuration view
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    colloquy_api::DEFAULT_BASE_URL.to_string()
}

fn default_api_timeout_secs() -> u64 {
    colloquy_api::DEFAULT_TIMEOUT.as_secs()
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_api_timeout_secs(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub request_timeout_ms: u64,
    #[serde(default = "default_queue_mode")]
    pub queue_mode: String,
}

fn default_queue_mode() -> String {
    "concurrent".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: 0,
            queue_mode: default_queue_mode(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSection {
    #[serde(default)]
    pub health_check_interval_secs: u64,
    #[serde(default)]
    pub check_api_health: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSection {
    #[serde(default = "default_event_capacity")]
    pub capacity: u64,
}

fn default_event_capacity() -> u64 {
    colloquy_core::orchestrator::DEFAULT_EVENT_CAPACITY as u64
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Settings of the `api-monitor` service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

fn default_monitor_interval() -> u64 {
    30
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
        }
    }
}

/// Settings of the `typing` module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingSection {
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,
}

fn default_stale_secs() -> u64 {
    120
}

impl Default for TypingSection {
    fn default() -> Self {
        Self {
            stale_secs: default_stale_secs(),
        }
    }
}
