use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Failure of a transport call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not reach the backend
    #[error("network error: {0}")]
    Network(String),

    /// No answer within the deadline
    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Backend answered with an error status
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP-like status code
        status: u16,
        /// Error description from the backend
        message: String,
    },

    /// Backend answered with something unparseable
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport not configured or backend switched off
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Message suitable for the chat history.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "🌐 Cannot reach the assistant. Check your connection and try again.".to_string()
            }
            Self::Timeout(d) => format!(
                "⏳ The assistant did not answer within {} seconds.",
                d.as_secs().max(1)
            ),
            Self::Api { status: 429, .. } => {
                "⏳ Too many requests. Please wait a moment and try again.".to_string()
            }
            Self::Api { message, .. } => {
                format!("❌ The assistant returned an error: {}", strip_paths(message))
            }
            Self::InvalidResponse(_) => {
                "❌ The assistant sent a response that could not be read.".to_string()
            }
            Self::Unavailable(reason) => {
                format!("🔌 The assistant is unavailable: {}", strip_paths(reason))
            }
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Unavailable(_) => false,
        }
    }
}

/// Strip absolute paths from text shown to users.
pub fn strip_paths(text: &str) -> String {
    static PATH_RE: OnceLock<Regex> = OnceLock::new();
    let re = PATH_RE.get_or_init(|| {
        Regex::new(r"(/[a-zA-Z0-9_.-]+){2,}").expect("path pattern is valid")
    });
    re.replace_all(text, "[PATH]").to_string()
}
