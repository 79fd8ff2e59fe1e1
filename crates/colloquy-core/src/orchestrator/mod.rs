//! Orchestrator - lifecycle sequencing for the whole system
//!
//! `initialize()` runs its phases strictly in order, each awaited before the
//! next:
//!
//! 1. cleanup: leftovers of an aborted attempt
//! 2. core: settings, pipeline, initial state (the only fatal phase)
//! 3. environment: app metadata into the state tree
//! 4. module load
//! 5. service start
//! 6. listener wiring: `message:submit`, `history:clear`, `system:error`,
//!    periodic health timer
//! 7. health check
//!
//! `destroy()` cancels in-flight messages, stops services then modules,
//! detaches listeners and cancels timers.

mod context;
mod core;
mod settings;
mod status;

#[cfg(test)]
mod tests;

pub use context::AppContext;
pub use core::{Orchestrator, OrchestratorBuilder};
pub use settings::{OrchestratorSettings, DEFAULT_EVENT_CAPACITY};
pub use status::{LifecycleState, SystemStatus};
