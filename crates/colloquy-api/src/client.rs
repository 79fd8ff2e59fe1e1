use crate::security::sanitize_api_error;
use crate::types::{ApiConfig, ApiErrorBody, ChatRequest, HealthBody};
use colloquy_core::transport::{ApiClient, ApiHealth, ApiResponse, TransportError};
use colloquy_core::SendOptions;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, instrument};

/// HTTP transport for the assistant backend
pub struct HttpApiClient {
    client: Client,
    config: ApiConfig,
}

impl HttpApiClient {
    /// Create a new client
    pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Unavailable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, TransportError> {
        Self::new(ApiConfig::default())
    }

    /// Connection settings
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.config.timeout)
        } else if e.is_connect() {
            TransportError::Network(format!(
                "failed to connect to the assistant backend at {}",
                self.config.base_url
            ))
        } else {
            TransportError::Network(sanitize_api_error(&e.to_string()))
        }
    }
}

/// Turn an error status and body into a sanitized [`TransportError`].
pub(crate) fn api_error(status: StatusCode, body: &str) -> TransportError {
    let message = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => sanitize_api_error(&parsed.error),
        // Raw bodies may be HTML error pages; only the status is reported.
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    };

    if status == StatusCode::SERVICE_UNAVAILABLE {
        return TransportError::Unavailable(message);
    }
    TransportError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait::async_trait]
impl ApiClient for HttpApiClient {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, text, options), fields(service_type = ?options.service_type, chars = text.chars().count()))]
    async fn send_message(
        &self,
        text: &str,
        options: &SendOptions,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.config.endpoint("chat");
        let body = ChatRequest {
            message: text,
            service_type: options.service_type,
            session_id: options.session_id.as_deref(),
            metadata: options.metadata.as_ref(),
        };

        debug!(url = %url, "Sending chat request");

        let response = self
            .authorized(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(format!("cannot parse chat response: {e}")))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<ApiHealth, TransportError> {
        let url = self.config.endpoint("health");

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let parsed: HealthBody = serde_json::from_str(&body).unwrap_or_default();
        Ok(ApiHealth { ok: parsed.is_ok() })
    }
}
