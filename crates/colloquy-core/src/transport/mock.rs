//! Scripted transport for tests and offline runs.

use super::{ApiClient, ApiHealth, ApiResponse, TransportError};
use crate::pipeline::SendOptions;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A transport that returns queued replies, or echoes the text when the
/// queue is empty.
#[derive(Clone)]
pub struct MockApiClient {
    replies: Arc<Mutex<VecDeque<Result<ApiResponse, TransportError>>>>,
    calls: Arc<Mutex<Vec<(String, SendOptions)>>>,
    delay: Option<Duration>,
    healthy: Arc<Mutex<bool>>,
}

impl MockApiClient {
    /// Create a healthy mock with an empty reply queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            healthy: Arc::new(Mutex::new(true)),
        }
    }

    /// Delay every `send_message` call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, response: ApiResponse) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: TransportError) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Switch the health probe result.
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap_or_else(|e| e.into_inner()) = healthy;
    }

    /// Every `(text, options)` pair sent so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, SendOptions)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ApiClient for MockApiClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_message(
        &self,
        text: &str,
        options: &SendOptions,
    ) -> Result<ApiResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((text.to_string(), options.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        queued.unwrap_or_else(|| Ok(ApiResponse::text(format!("echo: {text}"))))
    }

    async fn health_check(&self) -> Result<ApiHealth, TransportError> {
        let ok = *self.healthy.lock().unwrap_or_else(|e| e.into_inner());
        if ok {
            Ok(ApiHealth { ok })
        } else {
            Err(TransportError::Unavailable("mock backend marked unhealthy".to_string()))
        }
    }
}
