//! Colloquy Core - application orchestration for a chat-style assistant
//!
//! This crate owns everything with real state-machine logic:
//! - EventBus: synchronous publish/subscribe with a broadcast tap
//! - StateStore: JSON state tree with change notification
//! - Lifecycle: module/service registries with failure isolation
//! - Timers: owned, individually cancellable intervals and timeouts
//! - Pipeline: user message → capability detection → transport → history
//! - Orchestrator: startup/teardown sequencing and the process context
//!
//! Networking lives behind the [`ApiClient`] trait; configuration loading
//! lives in the binary behind [`ConfigProvider`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod lifecycle;
pub mod orchestrator;
pub mod pipeline;
pub mod state;
pub mod timers;
pub mod transport;

pub use config::{ConfigProvider, JsonConfig};
pub use error::{Error, Result};
pub use event_bus::{Event, EventBus, SubscriptionId, Topic};
pub use lifecycle::{
    Capability, HealthReport, HealthResult, Lifecycle, Registration, UnitContext, UnitKind,
};
pub use orchestrator::{
    AppContext, LifecycleState, Orchestrator, OrchestratorSettings, SystemStatus,
};
pub use pipeline::{
    detect_service_type, Message, MessageOutcome, MessagePhase, MessagePipeline, QueueMode, Role,
    SendOptions, ServiceType,
};
pub use state::StateStore;
pub use timers::{TimerId, TimerSet};
pub use transport::{ApiClient, ApiHealth, ApiResponse, MockApiClient, TransportError};
