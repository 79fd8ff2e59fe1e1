//! Pluggable module/service lifecycle
//!
//! A unit (module or service) is created by a factory from a static
//! registration table and may provide any of three optional capabilities:
//! initialize, health check and destroy. The [`Registry`] drives them and
//! isolates failures: one broken unit never aborts the others.
//!
//! ```text
//! register(name, factory, enabled)
//!        │
//!  start_all ──► factory(ctx) ──► initialize? ──► live   (module:loaded / service:started)
//!        │            └── error ──────┴──────────► failures (system:error)
//!  health_check_all ──► failures + health_check? of live units
//!  stop_all ──► destroy? (reverse order) ──► cancel unit timers ──► clear
//! ```

/// Health probe results.
pub mod health;
/// Unit registry driving the capabilities.
pub mod registry;
/// Capability trait and factory types.
pub mod unit;

pub use health::{HealthReport, HealthResult};
pub use registry::{FailureStage, Registry, Summary, UnitFailure};
pub use unit::{
    Capability, Collaborators, Lifecycle, Registration, UnitContext, UnitFactory, UnitKind,
};
