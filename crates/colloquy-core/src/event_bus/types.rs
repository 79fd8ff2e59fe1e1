use crate::lifecycle::HealthResult;
use crate::pipeline::SendOptions;
use crate::transport::ApiResponse;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Event topics known to the bus.
///
/// The string form (`as_str`) is the wire name presentation collaborators
/// see in the serialized `type` field of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Topic {
    /// Orchestrator finished all startup phases
    #[serde(rename = "system:initialized")]
    SystemInitialized,
    /// Aggregated health check result
    #[serde(rename = "system:health-check")]
    SystemHealthCheck,
    /// Orchestrator teardown completed
    #[serde(rename = "system:destroyed")]
    SystemDestroyed,
    /// Designated error-reporting topic
    #[serde(rename = "system:error")]
    SystemError,
    /// A module was started
    #[serde(rename = "module:loaded")]
    ModuleLoaded,
    /// A service was started
    #[serde(rename = "service:started")]
    ServiceStarted,
    /// Input: a user message should be sent
    #[serde(rename = "message:submit")]
    MessageSubmit,
    /// A message entered the pipeline
    #[serde(rename = "message:started")]
    MessageStarted,
    /// A message received its reply
    #[serde(rename = "message:completed")]
    MessageCompleted,
    /// A message failed
    #[serde(rename = "message:error")]
    MessageError,
    /// A message was cancelled by the caller
    #[serde(rename = "message:cancelled")]
    MessageCancelled,
    /// Input: the chat history should be cleared
    #[serde(rename = "history:clear")]
    HistoryClear,
    /// A state path was written
    #[serde(rename = "state:changed")]
    StateChanged,
}

impl Topic {
    /// Every topic, in catalogue order.
    pub const ALL: [Topic; 13] = [
        Topic::SystemInitialized,
        Topic::SystemHealthCheck,
        Topic::SystemDestroyed,
        Topic::SystemError,
        Topic::ModuleLoaded,
        Topic::ServiceStarted,
        Topic::MessageSubmit,
        Topic::MessageStarted,
        Topic::MessageCompleted,
        Topic::MessageError,
        Topic::MessageCancelled,
        Topic::HistoryClear,
        Topic::StateChanged,
    ];

    /// Returns the wire name of the topic
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemInitialized => "system:initialized",
            Self::SystemHealthCheck => "system:health-check",
            Self::SystemDestroyed => "system:destroyed",
            Self::SystemError => "system:error",
            Self::ModuleLoaded => "module:loaded",
            Self::ServiceStarted => "service:started",
            Self::MessageSubmit => "message:submit",
            Self::MessageStarted => "message:started",
            Self::MessageCompleted => "message:completed",
            Self::MessageError => "message:error",
            Self::MessageCancelled => "message:cancelled",
            Self::HistoryClear => "history:clear",
            Self::StateChanged => "state:changed",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events carried by the [`EventBus`](super::EventBus).
///
/// Payloads never include transport credentials; message text is included
/// because presentation collaborators render it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Event {
    /// All startup phases ran
    #[serde(rename = "system:initialized")]
    SystemInitialized {
        /// Wall time of `initialize()` in milliseconds
        #[serde(rename = "initTime")]
        init_time_ms: u64,
        /// Modules that started
        modules: Vec<String>,
        /// Services that started
        services: Vec<String>,
    },
    /// Health check summary
    #[serde(rename = "system:health-check")]
    SystemHealthCheck {
        /// Checks that passed
        passed: usize,
        /// Checks that failed
        failed: usize,
        /// Per-unit results
        results: Vec<HealthResult>,
    },
    /// Teardown finished
    #[serde(rename = "system:destroyed")]
    SystemDestroyed,
    /// An isolated failure somewhere in the system
    #[serde(rename = "system:error")]
    SystemError {
        /// Where the failure happened (e.g. `module:transcript`)
        source: String,
        /// Error description
        message: String,
    },
    /// Module started
    #[serde(rename = "module:loaded")]
    ModuleLoaded {
        /// Module name
        name: String,
    },
    /// Service started
    #[serde(rename = "service:started")]
    ServiceStarted {
        /// Service name
        name: String,
    },
    /// Request to send a user message
    #[serde(rename = "message:submit")]
    MessageSubmit {
        /// Raw user text
        text: String,
        /// Send options
        options: SendOptions,
    },
    /// Message accepted by the pipeline
    #[serde(rename = "message:started")]
    MessageStarted {
        /// Message identifier
        message_id: String,
        /// User text
        message: String,
        /// Send options (with the detected service type filled in)
        options: SendOptions,
    },
    /// Message answered
    #[serde(rename = "message:completed")]
    MessageCompleted {
        /// Message identifier
        message_id: String,
        /// Backend response
        response: ApiResponse,
        /// Time from submission to reply, in milliseconds
        #[serde(rename = "processingTime")]
        processing_time_ms: u64,
    },
    /// Message failed
    #[serde(rename = "message:error")]
    MessageError {
        /// Message identifier
        message_id: String,
        /// User-facing error description
        error: String,
    },
    /// Message cancelled before a reply arrived
    #[serde(rename = "message:cancelled")]
    MessageCancelled {
        /// Message identifier
        message_id: String,
    },
    /// Request to clear the chat history
    #[serde(rename = "history:clear")]
    HistoryClear,
    /// State written
    #[serde(rename = "state:changed")]
    StateChanged {
        /// Dotted path
        path: String,
        /// New value
        value: Value,
    },
}

impl Event {
    /// Topic this event is delivered on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::SystemInitialized { .. } => Topic::SystemInitialized,
            Self::SystemHealthCheck { .. } => Topic::SystemHealthCheck,
            Self::SystemDestroyed => Topic::SystemDestroyed,
            Self::SystemError { .. } => Topic::SystemError,
            Self::ModuleLoaded { .. } => Topic::ModuleLoaded,
            Self::ServiceStarted { .. } => Topic::ServiceStarted,
            Self::MessageSubmit { .. } => Topic::MessageSubmit,
            Self::MessageStarted { .. } => Topic::MessageStarted,
            Self::MessageCompleted { .. } => Topic::MessageCompleted,
            Self::MessageError { .. } => Topic::MessageError,
            Self::MessageCancelled { .. } => Topic::MessageCancelled,
            Self::HistoryClear => Topic::HistoryClear,
            Self::StateChanged { .. } => Topic::StateChanged,
        }
    }

    /// Message id for message-scoped events.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::MessageStarted { message_id, .. }
            | Self::MessageCompleted { message_id, .. }
            | Self::MessageError { message_id, .. }
            | Self::MessageCancelled { message_id } => Some(message_id),
            _ => None,
        }
    }
}
