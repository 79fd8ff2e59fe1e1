use colloquy_core::ServiceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Default backend URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend connection settings
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL; `/chat` and `/health` are appended
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Bearer token sent with every request
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            api_key: None,
        }
    }
}

impl ApiConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Absolute URL of an endpoint
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Body of `POST /chat`
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    /// User text
    pub message: &'a str,
    /// Backend capability to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    /// Conversation session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    /// Caller metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a Value>,
}

/// Error body returned by the backend
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Error description
    #[serde(alias = "detail", alias = "message")]
    pub error: String,
}

/// Body of `GET /health`; both `{"ok": true}` and `{"status": "ok"}` are accepted.
#[derive(Debug, Default, Deserialize)]
pub struct HealthBody {
    /// Explicit flag
    #[serde(default)]
    pub ok: Option<bool>,
    /// Status word
    #[serde(default)]
    pub status: Option<String>,
}

impl HealthBody {
    /// Whether the body reports a usable backend
    #[must_use]
    pub fn is_ok(&self) -> bool {
        match (self.ok, self.status.as_deref()) {
            (Some(ok), _) => ok,
            (None, Some(status)) => matches!(
                status.to_ascii_lowercase().as_str(),
                "ok" | "healthy" | "up"
            ),
            (None, None) => true,
        }
    }
}
