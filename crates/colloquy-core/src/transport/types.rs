use serde::{Deserialize, Serialize};

/// Answer returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Assistant answer text
    pub answer: String,
    /// Backend confidence in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Source documents cited by the answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Backend-side processing time in milliseconds
    #[serde(
        default,
        rename = "processing_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_time_ms: Option<u64>,
}

impl ApiResponse {
    /// Plain answer without metadata.
    #[must_use]
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            confidence: None,
            sources: Vec::new(),
            processing_time_ms: None,
        }
    }

    /// Set the confidence
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Add a cited source
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }
}

/// Result of a backend health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the backend reports itself usable
    pub ok: bool,
}
