//! Error types for colloquy-core
//!
//! Only fatal conditions (core-system bring-up, misuse of the lifecycle)
//! surface through [`Error`]. Isolated failures of modules, services, event
//! handlers and individual messages are converted into events and summaries.

use crate::orchestrator::LifecycleState;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config key
        field: String,
        /// Detailed message
        message: String,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("cannot {operation} while {state}")]
    InvalidLifecycle {
        /// Attempted operation
        operation: &'static str,
        /// State the orchestrator was in
        state: LifecycleState,
    },

    /// The orchestrator has not finished initializing
    #[error("orchestrator is not ready")]
    NotReady,

    /// A unit with the same name is already registered
    #[error("{kind} '{name}' is already registered")]
    DuplicateUnit {
        /// "module" or "service"
        kind: &'static str,
        /// Unit name
        name: String,
    },

    /// Malformed state path
    #[error("invalid state path: '{0}'")]
    InvalidPath(String),

    /// Internal error (serialization, runtime, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidConfig`].
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
