//! Process-scoped application context
//!
//! Holds the collaborators and the static unit table, and enforces the
//! one-live-orchestrator rule: [`AppContext::orchestrator`] hands out the
//! live instance when there is one, and a new instance only after the
//! previous one has been destroyed.

use super::core::Orchestrator;
use super::settings::DEFAULT_EVENT_CAPACITY;
use crate::config::ConfigProvider;
use crate::error::{Error, Result};
use crate::event_bus::EventBus;
use crate::lifecycle::{Lifecycle, Registration, UnitContext, UnitKind};
use crate::state::StateStore;
use crate::transport::ApiClient;
use std::sync::{Arc, Mutex};
use tracing::info;

type Slot = Arc<Mutex<Option<Orchestrator>>>;

/// Explicit replacement for a global orchestrator singleton.
///
/// Construct one per process at the entry point and pass it by reference.
/// The bus and state store outlive individual orchestrator instances, so
/// presentation collaborators subscribe once.
pub struct AppContext {
    bus: EventBus,
    state: StateStore,
    config: Arc<dyn ConfigProvider>,
    transport: Arc<dyn ApiClient>,
    modules: Vec<Registration>,
    services: Vec<Registration>,
    live: Slot,
}

impl AppContext {
    /// Create a context with an empty unit table.
    #[must_use]
    pub fn new(config: Arc<dyn ConfigProvider>, transport: Arc<dyn ApiClient>) -> Self {
        // Validated strictly in the core phase; here only a usable value matters.
        let capacity = config
            .get_u64("events.capacity")
            .ok()
            .flatten()
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(DEFAULT_EVENT_CAPACITY);
        let bus = EventBus::new(capacity);

        Self {
            state: StateStore::new(bus.clone()),
            bus,
            config,
            transport,
            modules: Vec::new(),
            services: Vec::new(),
            live: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a module. It is enabled unless `modules.<name>` is false.
    #[must_use]
    pub fn module<F>(self, name: &str, factory: F) -> Self
    where
        F: Fn(&UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> + Send + Sync + 'static,
    {
        let enabled = self.config.is_enabled(&format!("modules.{name}"), true);
        self.registration(UnitKind::Module, Registration::new(name, enabled, factory))
    }

    /// Add a service. It is enabled unless `services.<name>` is false.
    #[must_use]
    pub fn service<F>(self, name: &str, factory: F) -> Self
    where
        F: Fn(&UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> + Send + Sync + 'static,
    {
        let enabled = self.config.is_enabled(&format!("services.{name}"), true);
        self.registration(UnitKind::Service, Registration::new(name, enabled, factory))
    }

    /// Add a prepared registration.
    #[must_use]
    pub fn registration(mut self, kind: UnitKind, registration: Registration) -> Self {
        match kind {
            UnitKind::Module => self.modules.push(registration),
            UnitKind::Service => self.services.push(registration),
        }
        self
    }

    /// The live orchestrator, or a new one if none is live.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = live.as_ref() {
            return Ok(existing.clone());
        }

        let slot = Arc::downgrade(&self.live);
        let mut builder = Orchestrator::builder(
            self.bus.clone(),
            self.state.clone(),
            self.config.clone(),
            self.transport.clone(),
        )
        .with_destroy_hook(move |destroyed| {
            if let Some(slot) = slot.upgrade() {
                let mut live = slot.lock().unwrap_or_else(|e| e.into_inner());
                if live
                    .as_ref()
                    .is_some_and(|current| Orchestrator::ptr_eq(current, destroyed))
                {
                    *live = None;
                }
            }
        });
        for registration in &self.modules {
            builder = builder.with_module(registration.clone());
        }
        for registration in &self.services {
            builder = builder.with_service(registration.clone());
        }

        let orchestrator = builder.build()?;
        *live = Some(orchestrator.clone());
        Ok(orchestrator)
    }

    /// Get (or create) the orchestrator and initialize it.
    pub async fn initialize(&self) -> Result<Orchestrator> {
        self.orchestrator()?.initialize().await
    }

    /// Destroy the live instance (if any) and initialize a fresh one.
    pub async fn restart(&self) -> Result<Orchestrator> {
        if let Some(current) = self.current() {
            info!(state = %current.state(), "Restarting orchestrator");
            match current.destroy().await {
                Ok(()) => {}
                // Never initialized: nothing to tear down, just replace it.
                Err(Error::InvalidLifecycle { .. }) => self.forget(&current),
                Err(e) => return Err(e),
            }
        }
        self.initialize().await
    }

    /// The live instance, without creating one.
    #[must_use]
    pub fn current(&self) -> Option<Orchestrator> {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn forget(&self, orchestrator: &Orchestrator) {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if live
            .as_ref()
            .is_some_and(|current| Orchestrator::ptr_eq(current, orchestrator))
        {
            *live = None;
        }
    }

    /// Event bus shared by every instance
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// State store shared by every instance
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Configuration provider
    #[must_use]
    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }
}
