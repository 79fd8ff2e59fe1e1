use crate::error::{Error, Result};
use crate::transport::ApiResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Backend handling category of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Data query (SQL generation / reporting)
    Sql,
    /// ERP domain knowledge
    Erp,
    /// Everything else
    General,
}

impl ServiceType {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Erp => "erp",
            Self::General => "general",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Self::Sql),
            "erp" => Ok(Self::Erp),
            "general" => Ok(Self::General),
            other => Err(Error::config(
                "service_type",
                format!("unknown service type '{other}' (expected sql, erp or general)"),
            )),
        }
    }
}

/// Options accompanying a submitted message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Forced service type; detected from the text when `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    /// Conversation session identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form metadata forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SendOptions {
    /// Force a service type
    #[must_use]
    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = Some(service_type);
        self
    }

    /// Set the session identifier
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Author of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user
    User,
    /// Answer from the backend
    Assistant,
    /// Produced by the application itself
    System,
    /// User-visible failure notice
    Error,
}

/// One entry of the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub id: String,
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Optional extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Per-message state machine: `Submitted → Dispatched → (Completed | Failed)`.
///
/// A message can also be `Cancelled` from either non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePhase {
    /// Accepted, waiting for a dispatch slot
    Submitted,
    /// Handed to the transport
    Dispatched,
    /// Reply received
    Completed,
    /// Transport failed or timed out
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl MessagePhase {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MessagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one `submit`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// The backend answered
    Completed {
        /// Message identifier
        message_id: String,
        /// Backend answer
        response: ApiResponse,
        /// Time from submission to reply
        processing_time_ms: u64,
    },
    /// The transport failed
    Failed {
        /// Message identifier
        message_id: String,
        /// User-facing error description
        error: String,
    },
    /// Cancelled before the backend answered
    Cancelled {
        /// Message identifier
        message_id: String,
    },
}

impl MessageOutcome {
    /// Identifier of the message this outcome belongs to.
    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            Self::Completed { message_id, .. }
            | Self::Failed { message_id, .. }
            | Self::Cancelled { message_id } => message_id,
        }
    }

    /// Terminal phase reached.
    #[must_use]
    pub fn phase(&self) -> MessagePhase {
        match self {
            Self::Completed { .. } => MessagePhase::Completed,
            Self::Failed { .. } => MessagePhase::Failed,
            Self::Cancelled { .. } => MessagePhase::Cancelled,
        }
    }
}

/// How concurrent submissions are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Every submission is dispatched immediately
    #[default]
    Concurrent,
    /// One dispatch at a time, in arrival order
    Sequential,
}

impl FromStr for QueueMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(Self::Concurrent),
            "sequential" => Ok(Self::Sequential),
            other => Err(Error::config(
                "pipeline.queue_mode",
                format!("unknown queue mode '{other}' (expected concurrent or sequential)"),
            )),
        }
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Dispatch policy
    pub queue_mode: QueueMode,
    /// Per-request deadline; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

/// Counters since the pipeline was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    /// Accepted submissions
    pub submitted: u64,
    /// Completed messages
    pub completed: u64,
    /// Failed messages
    pub failed: u64,
    /// Cancelled messages
    pub cancelled: u64,
    /// Blank submissions ignored
    pub rejected: u64,
    /// Mean processing time of completed messages
    pub avg_processing_time_ms: u64,
}
