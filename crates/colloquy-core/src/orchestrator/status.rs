use crate::lifecycle::{HealthReport, UnitFailure};
use crate::pipeline::PipelineStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Orchestrator lifecycle.
///
/// `Uninitialized → Initializing → Ready → Destroying → Destroyed`. There is
/// no way back from `Ready` to `Initializing`: restarting builds a fresh
/// instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, `initialize()` not yet called
    #[default]
    Uninitialized,
    /// Startup phases running
    Initializing,
    /// Accepting messages
    Ready,
    /// Teardown running
    Destroying,
    /// Torn down
    Destroyed,
}

impl LifecycleState {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of the system, serialisable for `status` output.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// Lifecycle state
    pub state: LifecycleState,
    /// Application name
    pub app_name: String,
    /// Deployment environment
    pub environment: String,
    /// When `initialize()` completed
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since `initialize()` completed
    pub uptime_secs: u64,
    /// Wall time of `initialize()`
    pub init_time_ms: u64,
    /// Live modules, in start order
    pub modules: Vec<String>,
    /// Live services, in start order
    pub services: Vec<String>,
    /// Units that failed to start
    pub failed_units: Vec<UnitFailure>,
    /// Pipeline counters
    pub pipeline: PipelineStats,
    /// Messages currently in flight
    pub in_flight: usize,
    /// Events emitted on the bus
    pub events_emitted: u64,
    /// Event handler failures
    pub handler_failures: u64,
    /// Reports seen on `system:error`
    pub errors_reported: u64,
    /// Most recent health report
    pub last_health: Option<HealthReport>,
}
