use super::health::HealthResult;
use super::unit::{Capability, Collaborators, Lifecycle, Registration, UnitKind};
use crate::error::{Error, Result};
use crate::event_bus::Event;
use crate::timers::TimerSet;
use anyhow::anyhow;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The factory returned an error
    Create,
    /// The initialize capability failed
    Initialize,
    /// The destroy capability failed
    Destroy,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Initialize => write!(f, "initialize"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// An isolated unit failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    /// Unit name
    pub name: String,
    /// Stage that failed
    pub stage: FailureStage,
    /// Error description
    pub error: String,
}

/// Outcome of `start_all` / `stop_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Registry namespace
    pub kind: UnitKind,
    /// Units started (or stopped) successfully, in processing order
    pub succeeded: Vec<String>,
    /// Units that failed
    pub failed: Vec<UnitFailure>,
    /// Disabled units that were not started
    pub skipped: Vec<String>,
}

impl Summary {
    fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

struct LiveUnit {
    name: String,
    instance: Arc<dyn Lifecycle>,
    timers: TimerSet,
}

/// Insertion-ordered registry of modules or services.
///
/// Modules and services use two separate registries, so their names never
/// collide.
pub struct Registry {
    kind: UnitKind,
    collaborators: Collaborators,
    registrations: Vec<Registration>,
    live: Vec<LiveUnit>,
    failures: Vec<UnitFailure>,
}

impl Registry {
    /// Create an empty registry whose units receive `collaborators`.
    #[must_use]
    pub fn new(kind: UnitKind, collaborators: Collaborators) -> Self {
        Self {
            kind,
            collaborators,
            registrations: Vec::new(),
            live: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Add a registration. Names must be unique within the registry.
    pub fn register(&mut self, registration: Registration) -> Result<()> {
        if self.registrations.iter().any(|r| r.name == registration.name) {
            return Err(Error::DuplicateUnit {
                kind: self.kind.as_str(),
                name: registration.name,
            });
        }
        debug!(kind = %self.kind, name = %registration.name, enabled = registration.enabled, "Unit registered");
        self.registrations.push(registration);
        Ok(())
    }

    /// Create and initialize every enabled registration, in order.
    ///
    /// Failures are logged, reported on `system:error` and recorded; the
    /// remaining units are still started.
    pub async fn start_all(&mut self) -> Summary {
        let mut summary = Summary::new(self.kind);

        for registration in self.registrations.clone() {
            let name = registration.name.as_str();
            if !registration.enabled {
                debug!(kind = %self.kind, name, "Unit disabled, skipping");
                summary.skipped.push(name.to_string());
                continue;
            }
            if self.live.iter().any(|u| u.name == name) {
                continue;
            }
            self.failures.retain(|f| f.name != name);

            let timers = TimerSet::new();
            let ctx = self.collaborators.context(name, self.kind, timers.clone());
            let created = panic::catch_unwind(AssertUnwindSafe(|| (registration.factory)(&ctx)))
                .unwrap_or_else(|_| Err(anyhow!("factory panicked")));

            let instance = match created {
                Ok(instance) => instance,
                Err(e) => {
                    timers.cancel_all();
                    summary
                        .failed
                        .push(self.record_failure(name, FailureStage::Create, &e));
                    continue;
                }
            };

            let initialized = guarded(instance.initialize()).await;
            match initialized {
                None | Some(Ok(())) => {
                    info!(kind = %self.kind, name, "Unit started");
                    self.live.push(LiveUnit {
                        name: name.to_string(),
                        instance,
                        timers,
                    });
                    summary.succeeded.push(name.to_string());
                    self.collaborators.bus.emit(self.kind.started_event(name));
                }
                Some(Err(e)) => {
                    timers.cancel_all();
                    summary
                        .failed
                        .push(self.record_failure(name, FailureStage::Initialize, &e));
                }
            }
        }

        summary
    }

    /// Destroy every live unit in reverse start order, then clear the registry.
    ///
    /// The registry is empty afterwards whatever the individual outcomes.
    pub async fn stop_all(&mut self) -> Summary {
        let mut summary = Summary::new(self.kind);

        while let Some(unit) = self.live.pop() {
            match guarded(unit.instance.destroy()).await {
                None | Some(Ok(())) => {
                    info!(kind = %self.kind, name = %unit.name, "Unit stopped");
                    summary.succeeded.push(unit.name.clone());
                }
                Some(Err(e)) => {
                    summary
                        .failed
                        .push(self.record_failure(&unit.name, FailureStage::Destroy, &e));
                }
            }
            let cancelled = unit.timers.cancel_all();
            if cancelled > 0 {
                debug!(kind = %self.kind, name = %unit.name, cancelled, "Unit timers cancelled");
            }
        }

        self.failures.clear();
        self.registrations.clear();
        summary
    }

    /// Probe every unit.
    ///
    /// Units that failed to start are reported as failed; live units without
    /// a health-check capability are not reported. Never fails.
    pub async fn health_check_all(&self) -> Vec<HealthResult> {
        let kind = self.kind.as_str();
        let mut results: Vec<HealthResult> = self
            .failures
            .iter()
            .filter(|f| f.stage != FailureStage::Destroy)
            .map(|f| HealthResult::failed(&f.name, kind, format!("failed to {}: {}", f.stage, f.error)))
            .collect();

        for unit in &self.live {
            match guarded(unit.instance.health_check()).await {
                None => {}
                Some(Ok(())) => results.push(HealthResult::passed(&unit.name, kind)),
                Some(Err(e)) => {
                    warn!(kind, name = %unit.name, error = %e, "Health check failed");
                    results.push(HealthResult::failed(&unit.name, kind, format!("{e:#}")));
                }
            }
        }

        results
    }

    fn record_failure(&mut self, name: &str, stage: FailureStage, e: &anyhow::Error) -> UnitFailure {
        let failure = UnitFailure {
            name: name.to_string(),
            stage,
            error: format!("{e:#}"),
        };
        error!(kind = %self.kind, name, stage = %stage, error = %failure.error, "Unit failed");
        self.collaborators.bus.emit(Event::SystemError {
            source: format!("{}:{}", self.kind, name),
            message: format!("{stage} failed: {}", failure.error),
        });
        if stage != FailureStage::Destroy {
            self.failures.push(failure.clone());
        }
        failure
    }

    /// Names of live units, in start order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.live.iter().map(|u| u.name.clone()).collect()
    }

    /// Live unit by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Lifecycle>> {
        self.live
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.instance.clone())
    }

    /// Units that failed to start this session.
    #[must_use]
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    /// Number of live units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no unit is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of registrations, enabled or not.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registrations.len()
    }

    /// Registry namespace
    #[must_use]
    pub fn kind(&self) -> UnitKind {
        self.kind
    }
}

/// Run a capability, converting a panic into a failed capability.
async fn guarded<F>(hook: F) -> Capability
where
    F: Future<Output = Capability>,
{
    AssertUnwindSafe(hook)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Some(Err(anyhow!("lifecycle hook panicked"))))
}
