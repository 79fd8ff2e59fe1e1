//! Orchestrator core implementation
//!
//! Contains the `Orchestrator` struct, its builder, and the startup and
//! teardown sequences.

use super::settings::OrchestratorSettings;
use super::status::{LifecycleState, SystemStatus};
use crate::config::ConfigProvider;
use crate::error::{Error, Result};
use crate::event_bus::{Event, EventBus, SubscriptionId, Topic};
use crate::lifecycle::{
    Collaborators, HealthReport, HealthResult, Registration, Registry, UnitKind,
};
use crate::pipeline::{
    MessageOutcome, MessagePipeline, SendOptions, HISTORY_PATH, IN_FLIGHT_PATH, PROCESSING_PATH,
};
use crate::state::StateStore;
use crate::timers::TimerSet;
use crate::transport::ApiClient;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `destroy()` waits for cancelled messages to settle.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Startup phases, in execution order.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Cleanup,
    Core,
    Environment,
    ModuleLoad,
    ServiceStart,
    Listeners,
    HealthCheck,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cleanup => "cleanup",
            Self::Core => "core",
            Self::Environment => "environment",
            Self::ModuleLoad => "module_load",
            Self::ServiceStart => "service_start",
            Self::Listeners => "listeners",
            Self::HealthCheck => "health_check",
        };
        f.write_str(name)
    }
}

type DestroyHook = Box<dyn Fn(&Orchestrator) + Send + Sync>;

struct Shared {
    bus: EventBus,
    state: StateStore,
    config: Arc<dyn ConfigProvider>,
    transport: Arc<dyn ApiClient>,
    modules: tokio::sync::Mutex<Registry>,
    services: tokio::sync::Mutex<Registry>,
    pipeline: OnceLock<MessagePipeline>,
    settings: RwLock<OrchestratorSettings>,
    lifecycle: RwLock<LifecycleState>,
    init_lock: tokio::sync::Mutex<()>,
    destroying: AtomicBool,
    teardown_done: tokio::sync::Notify,
    listeners: Mutex<Vec<SubscriptionId>>,
    timers: TimerSet,
    last_health: RwLock<Option<HealthReport>>,
    init_time_ms: AtomicU64,
    started: Mutex<Option<(Instant, DateTime<Utc>)>>,
    errors_reported: Arc<AtomicU64>,
    on_destroyed: Option<DestroyHook>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    bus: EventBus,
    state: StateStore,
    config: Arc<dyn ConfigProvider>,
    transport: Arc<dyn ApiClient>,
    modules: Vec<Registration>,
    services: Vec<Registration>,
    on_destroyed: Option<DestroyHook>,
}

impl OrchestratorBuilder {
    /// Add a module registration
    #[must_use]
    pub fn with_module(mut self, registration: Registration) -> Self {
        self.modules.push(registration);
        self
    }

    /// Add a service registration
    #[must_use]
    pub fn with_service(mut self, registration: Registration) -> Self {
        self.services.push(registration);
        self
    }

    /// Run `hook` after a completed teardown
    #[must_use]
    pub fn with_destroy_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Orchestrator) + Send + Sync + 'static,
    {
        self.on_destroyed = Some(Box::new(hook));
        self
    }

    /// Register every unit and build the orchestrator.
    ///
    /// Fails with [`Error::DuplicateUnit`] when two units of the same kind
    /// share a name.
    pub fn build(self) -> Result<Orchestrator> {
        let collaborators = Collaborators {
            bus: self.bus.clone(),
            state: self.state.clone(),
            config: self.config.clone(),
            transport: self.transport.clone(),
        };

        let mut modules = Registry::new(UnitKind::Module, collaborators.clone());
        for registration in self.modules {
            modules.register(registration)?;
        }
        let mut services = Registry::new(UnitKind::Service, collaborators);
        for registration in self.services {
            services.register(registration)?;
        }

        Ok(Orchestrator {
            shared: Arc::new(Shared {
                bus: self.bus,
                state: self.state,
                config: self.config,
                transport: self.transport,
                modules: tokio::sync::Mutex::new(modules),
                services: tokio::sync::Mutex::new(services),
                pipeline: OnceLock::new(),
                settings: RwLock::new(OrchestratorSettings::default()),
                lifecycle: RwLock::new(LifecycleState::Uninitialized),
                init_lock: tokio::sync::Mutex::new(()),
                destroying: AtomicBool::new(false),
                teardown_done: tokio::sync::Notify::new(),
                listeners: Mutex::new(Vec::new()),
                timers: TimerSet::new(),
                last_health: RwLock::new(None),
                init_time_ms: AtomicU64::new(0),
                started: Mutex::new(None),
                errors_reported: Arc::new(AtomicU64::new(0)),
                on_destroyed: self.on_destroyed,
            }),
        })
    }
}

/// Top-level lifecycle state machine.
///
/// Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Start building an orchestrator around the given collaborators.
    #[must_use]
    pub fn builder(
        bus: EventBus,
        state: StateStore,
        config: Arc<dyn ConfigProvider>,
        transport: Arc<dyn ApiClient>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            bus,
            state,
            config,
            transport,
            modules: Vec::new(),
            services: Vec::new(),
            on_destroyed: None,
        }
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    /// Whether two handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    /// Run the startup phases.
    ///
    /// Calling this again while `Ready` is a no-op returning the same
    /// instance. Only a core-systems failure is returned as an error, in which
    /// case the orchestrator goes back to `Uninitialized`.
    pub async fn initialize(&self) -> Result<Self> {
        let _init = self.shared.init_lock.lock().await;

        match self.state() {
            LifecycleState::Ready => {
                debug!("Orchestrator already initialized");
                return Ok(self.clone());
            }
            LifecycleState::Uninitialized => {}
            state => {
                return Err(Error::InvalidLifecycle {
                    operation: "initialize",
                    state,
                })
            }
        }

        let started = Instant::now();
        self.set_state(LifecycleState::Initializing);
        info!("Initializing orchestrator");

        self.phase_cleanup();

        if let Err(e) = self.phase_core() {
            error!(phase = %Phase::Core, error = %e, "Core systems failed, aborting initialization");
            self.set_state(LifecycleState::Uninitialized);
            return Err(e);
        }

        self.phase_environment();

        let modules = self.shared.modules.lock().await.start_all().await;
        log_phase(Phase::ModuleLoad, modules.succeeded.len(), modules.failed.len());

        let services = self.shared.services.lock().await.start_all().await;
        log_phase(Phase::ServiceStart, services.succeeded.len(), services.failed.len());

        self.phase_listeners();

        let report = self.run_health_check().await;
        log_phase(Phase::HealthCheck, report.passed, report.failed);

        let init_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.shared.init_time_ms.store(init_time_ms, Ordering::Relaxed);
        *self.shared.started.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((Instant::now(), Utc::now()));
        self.set_state(LifecycleState::Ready);

        info!(
            init_time_ms,
            modules = modules.succeeded.len(),
            services = services.succeeded.len(),
            "Orchestrator ready"
        );
        self.shared.bus.emit(Event::SystemInitialized {
            init_time_ms,
            modules: modules.succeeded,
            services: services.succeeded,
        });

        Ok(self.clone())
    }

    /// Drop leftovers of an earlier, aborted initialization.
    fn phase_cleanup(&self) {
        let detached = self.detach_listeners();
        let cancelled = self.shared.timers.cancel_all();
        debug!(phase = %Phase::Cleanup, detached, cancelled, "Phase complete");
    }

    /// Bring up settings, pipeline and the initial state tree. Fatal on error.
    fn phase_core(&self) -> Result<()> {
        let settings = OrchestratorSettings::from_config(self.shared.config.as_ref())?;

        self.shared.pipeline.get_or_init(|| {
            MessagePipeline::new(
                self.shared.bus.clone(),
                self.shared.state.clone(),
                self.shared.transport.clone(),
                settings.pipeline.clone(),
            )
        });

        let state = &self.shared.state;
        if state.get(HISTORY_PATH).is_none() {
            state.set(HISTORY_PATH, json!([]))?;
        }
        state.set(PROCESSING_PATH, false)?;
        state.set(IN_FLIGHT_PATH, json!({}))?;

        *self.shared.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        debug!(phase = %Phase::Core, "Phase complete");
        Ok(())
    }

    /// Publish application metadata into the state tree.
    fn phase_environment(&self) {
        let settings = self.settings();
        let state = &self.shared.state;
        let written = state
            .set("app.name", settings.app_name.as_str())
            .and_then(|()| state.set("app.environment", settings.environment.as_str()))
            .and_then(|()| state.set("app.debug", settings.debug));
        if let Err(e) = written {
            warn!(phase = %Phase::Environment, error = %e, "Failed to publish app metadata");
        }
        if settings.debug {
            debug!(phase = %Phase::Environment, "Debug mode enabled");
        }
        info!(
            phase = %Phase::Environment,
            app = %settings.app_name,
            environment = %settings.environment,
            transport = self.shared.transport.name(),
            "Phase complete"
        );
    }

    /// Route input topics to the pipeline and start background timers.
    fn phase_listeners(&self) {
        let Some(pipeline) = self.shared.pipeline.get().cloned() else {
            return;
        };
        let bus = &self.shared.bus;
        let mut ids = Vec::new();

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        ids.push(bus.on(Topic::MessageSubmit, move |event| {
            let Event::MessageSubmit { text, options } = event else {
                return Ok(());
            };
            let Some(orchestrator) = Orchestrator::upgrade(&weak) else {
                return Ok(());
            };
            if orchestrator.state() != LifecycleState::Ready {
                debug!(state = %orchestrator.state(), "Dropping message:submit");
                return Ok(());
            }
            let handle = tokio::runtime::Handle::try_current()
                .context("message:submit needs a tokio runtime")?;
            let text = text.clone();
            let options = options.clone();
            handle.spawn(async move {
                // Teardown may have started since the event was accepted.
                if let Err(e) = orchestrator.send_message(&text, options).await {
                    debug!(error = %e, "Dropping message:submit");
                }
            });
            Ok(())
        }));

        ids.push(bus.on(Topic::HistoryClear, move |_| {
            pipeline.clear_history();
            Ok(())
        }));

        let errors = self.shared.errors_reported.clone();
        ids.push(bus.on(Topic::SystemError, move |_| {
            errors.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }));

        let registered = ids.len();
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(ids);

        if let Some(period) = self.settings().health_check_interval {
            let weak: Weak<Shared> = Arc::downgrade(&self.shared);
            self.shared.timers.interval(period, move || {
                let weak = weak.clone();
                async move {
                    if let Some(orchestrator) = Orchestrator::upgrade(&weak) {
                        if orchestrator.state() == LifecycleState::Ready {
                            orchestrator.run_health_check().await;
                        }
                    }
                }
            });
            debug!(interval_secs = period.as_secs(), "Periodic health check scheduled");
        }

        debug!(phase = %Phase::Listeners, listeners = registered, "Phase complete");
    }

    /// Tear everything down.
    ///
    /// A call made while a teardown is running does not tear down again; it
    /// waits for the running one to finish. Calling it on a destroyed
    /// instance is a no-op. Destroying an instance that was never initialized
    /// is an error.
    pub async fn destroy(&self) -> Result<()> {
        if self
            .shared
            .destroying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Destroy already in progress, waiting for it");
            self.wait_for_teardown().await;
            return Ok(());
        }
        let _destroying = DestroyingGuard(&self.shared);
        let _init = self.shared.init_lock.lock().await;

        match self.state() {
            LifecycleState::Destroyed => {
                debug!("Orchestrator already destroyed");
                return Ok(());
            }
            LifecycleState::Uninitialized => {
                return Err(Error::InvalidLifecycle {
                    operation: "destroy",
                    state: LifecycleState::Uninitialized,
                })
            }
            _ => {}
        }

        self.set_state(LifecycleState::Destroying);
        info!("Destroying orchestrator");

        // Stop taking input before anything in flight is cancelled.
        let detached = self.detach_listeners();
        let timers = self.shared.timers.cancel_all();

        if let Some(pipeline) = self.shared.pipeline.get() {
            let cancelled = pipeline.cancel_all();
            if cancelled > 0 {
                let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                    while pipeline.is_processing() {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                })
                .await
                .is_ok();
                if !drained {
                    warn!(cancelled, "In-flight messages did not settle before teardown");
                }
            }
        }

        let services = self.shared.services.lock().await.stop_all().await;
        let modules = self.shared.modules.lock().await.stop_all().await;

        self.set_state(LifecycleState::Destroyed);
        info!(
            services = services.succeeded.len(),
            modules = modules.succeeded.len(),
            failures = services.failed.len() + modules.failed.len(),
            listeners = detached,
            timers,
            "Orchestrator destroyed"
        );
        self.shared.bus.emit(Event::SystemDestroyed);

        if let Some(hook) = &self.shared.on_destroyed {
            hook(self);
        }
        Ok(())
    }

    /// Run a health check over every unit (and the backend, if configured).
    pub async fn health_check(&self) -> Result<HealthReport> {
        self.ensure_ready("run a health check")?;
        Ok(self.run_health_check().await)
    }

    async fn run_health_check(&self) -> HealthReport {
        let mut results = self.shared.modules.lock().await.health_check_all().await;
        results.extend(self.shared.services.lock().await.health_check_all().await);

        if self.settings().check_api_health {
            let name = self.shared.transport.name().to_string();
            results.push(match self.shared.transport.health_check().await {
                Ok(health) if health.ok => HealthResult::passed(name, "api"),
                Ok(_) => HealthResult::failed(name, "api", "backend reported not ok"),
                Err(e) => HealthResult::failed(name, "api", e.to_string()),
            });
        }

        let report = HealthReport::from_results(results);
        if report.is_healthy() {
            info!(passed = report.passed, "Health check passed");
        } else {
            warn!(passed = report.passed, failed = report.failed, "Health check found failures");
        }

        *self.shared.last_health.write().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        self.shared.bus.emit(Event::SystemHealthCheck {
            passed: report.passed,
            failed: report.failed,
            results: report.details.clone(),
        });
        report
    }

    /// Send a user message through the pipeline and wait for its outcome.
    ///
    /// Returns `Ok(None)` for blank text.
    pub async fn send_message(
        &self,
        text: &str,
        options: SendOptions,
    ) -> Result<Option<MessageOutcome>> {
        let pipeline = self.ready_pipeline("send a message")?;
        Ok(pipeline.submit(text, options).await)
    }

    /// Cancel one in-flight message.
    pub fn cancel_message(&self, message_id: &str) -> Result<bool> {
        Ok(self.ready_pipeline("cancel a message")?.cancel(message_id))
    }

    /// Empty the chat history.
    pub fn clear_history(&self) -> Result<()> {
        self.ready_pipeline("clear the history")?.clear_history();
        Ok(())
    }

    /// Whether a message is still waiting for its reply.
    #[must_use]
    pub fn has_unsaved_data(&self) -> bool {
        self.shared.state.has_unsaved_data()
    }

    /// Snapshot of the whole system.
    pub async fn status(&self) -> SystemStatus {
        let settings = self.settings();
        let (modules, mut failed_units) = {
            let registry = self.shared.modules.lock().await;
            (registry.names(), registry.failures().to_vec())
        };
        let (services, service_failures) = {
            let registry = self.shared.services.lock().await;
            (registry.names(), registry.failures().to_vec())
        };
        failed_units.extend(service_failures);

        let started = *self.shared.started.lock().unwrap_or_else(|e| e.into_inner());
        let pipeline = self.shared.pipeline.get();

        SystemStatus {
            state: self.state(),
            app_name: settings.app_name,
            environment: settings.environment,
            started_at: started.map(|(_, at)| at),
            uptime_secs: started.map_or(0, |(since, _)| since.elapsed().as_secs()),
            init_time_ms: self.shared.init_time_ms.load(Ordering::Relaxed),
            modules,
            services,
            failed_units,
            pipeline: pipeline.map(MessagePipeline::stats).unwrap_or_default(),
            in_flight: pipeline.map_or(0, MessagePipeline::in_flight_count),
            events_emitted: self.shared.bus.emitted_count(),
            handler_failures: self.shared.bus.failure_count(),
            errors_reported: self.shared.errors_reported.load(Ordering::Relaxed),
            last_health: self
                .shared
                .last_health
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.shared.lifecycle.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Settings in effect (defaults until the core phase ran)
    #[must_use]
    pub fn settings(&self) -> OrchestratorSettings {
        self.shared
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event bus
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// State store
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.shared.state
    }

    /// Message pipeline, once the core phase has run
    #[must_use]
    pub fn pipeline(&self) -> Option<&MessagePipeline> {
        self.shared.pipeline.get()
    }

    /// Names of live modules
    pub async fn modules(&self) -> Vec<String> {
        self.shared.modules.lock().await.names()
    }

    /// Names of live services
    pub async fn services(&self) -> Vec<String> {
        self.shared.services.lock().await.names()
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.shared.lifecycle.write().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*state, to = %next, "Lifecycle transition");
        *state = next;
    }

    fn ensure_ready(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            LifecycleState::Ready => Ok(()),
            LifecycleState::Uninitialized | LifecycleState::Initializing => Err(Error::NotReady),
            state => Err(Error::InvalidLifecycle { operation, state }),
        }
    }

    fn ready_pipeline(&self, operation: &'static str) -> Result<&MessagePipeline> {
        self.ensure_ready(operation)?;
        self.shared.pipeline.get().ok_or(Error::NotReady)
    }

    async fn wait_for_teardown(&self) {
        loop {
            let done = self.shared.teardown_done.notified();
            tokio::pin!(done);
            done.as_mut().enable();
            if !self.shared.destroying.load(Ordering::SeqCst) {
                return;
            }
            done.await;
        }
    }

    fn detach_listeners(&self) -> usize {
        let ids: Vec<SubscriptionId> = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        ids.into_iter().filter(|id| self.shared.bus.off(*id)).count()
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("transport", &self.shared.transport.name())
            .finish()
    }
}

fn log_phase(phase: Phase, succeeded: usize, failed: usize) {
    if failed > 0 {
        warn!(phase = %phase, succeeded, failed, "Phase complete with failures");
    } else {
        info!(phase = %phase, succeeded, "Phase complete");
    }
}

/// Clears the destroying flag however `destroy` exits and wakes waiters.
struct DestroyingGuard<'a>(&'a Shared);

impl Drop for DestroyingGuard<'_> {
    fn drop(&mut self) {
        self.0.destroying.store(false, Ordering::SeqCst);
        self.0.teardown_done.notify_waiters();
    }
}
