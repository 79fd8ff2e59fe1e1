//! EventBus - synchronous publish/subscribe between orchestrator parts.
//!
//! Modules, services and presentation collaborators communicate through
//! topics instead of calling each other. Synchronous handlers run in
//! subscription order on the emitting task; a broadcast tap mirrors every
//! event for async consumers such as terminal renderers.

/// Core event bus implementation.
pub mod bus;
/// Topic and event definitions.
pub mod types;

pub use bus::{EventBus, Handler, SubscriptionId};
pub use types::{Event, Topic};
