use crate::config::ConfigProvider;
use crate::event_bus::{Event, EventBus};
use crate::state::StateStore;
use crate::timers::TimerSet;
use crate::transport::ApiClient;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Outcome of an optional capability.
///
/// `None` means the unit does not provide the capability, which the registry
/// treats as a successful no-op.
pub type Capability = Option<anyhow::Result<()>>;

/// Lifecycle capabilities of a module or service.
///
/// Every method defaults to "not provided". Implement only what the unit
/// needs and return `Some(result)` from it.
#[async_trait::async_trait]
pub trait Lifecycle: Send + Sync {
    /// Bring the unit up after construction.
    async fn initialize(&self) -> Capability {
        None
    }

    /// Report whether the unit is still healthy.
    async fn health_check(&self) -> Capability {
        None
    }

    /// Release resources (modules are destroyed, services stopped).
    async fn destroy(&self) -> Capability {
        None
    }
}

/// Registry namespace a unit lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Chat-facing feature
    Module,
    /// Cross-cutting infrastructure
    Service,
}

impl UnitKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Service => "service",
        }
    }

    /// Event announcing a successfully started unit of this kind.
    #[must_use]
    pub fn started_event(&self, name: &str) -> Event {
        match self {
            Self::Module => Event::ModuleLoaded {
                name: name.to_string(),
            },
            Self::Service => Event::ServiceStarted {
                name: name.to_string(),
            },
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared collaborators injected into every unit.
#[derive(Clone)]
pub struct Collaborators {
    /// Event bus
    pub bus: EventBus,
    /// State store
    pub state: StateStore,
    /// Read-only configuration
    pub config: Arc<dyn ConfigProvider>,
    /// Backend transport
    pub transport: Arc<dyn ApiClient>,
}

impl Collaborators {
    /// Build the context handed to one unit's factory.
    #[must_use]
    pub fn context(&self, name: &str, kind: UnitKind, timers: TimerSet) -> UnitContext {
        UnitContext {
            name: name.to_string(),
            kind,
            bus: self.bus.clone(),
            state: self.state.clone(),
            config: self.config.clone(),
            transport: self.transport.clone(),
            timers,
        }
    }
}

/// Everything a unit factory receives.
#[derive(Clone)]
pub struct UnitContext {
    /// Registered unit name
    pub name: String,
    /// Module or service
    pub kind: UnitKind,
    /// Event bus
    pub bus: EventBus,
    /// State store
    pub state: StateStore,
    /// Read-only configuration
    pub config: Arc<dyn ConfigProvider>,
    /// Backend transport
    pub transport: Arc<dyn ApiClient>,
    /// Timers owned by this unit, cancelled when it is torn down
    pub timers: TimerSet,
}

/// Constructor of a unit.
pub type UnitFactory =
    Arc<dyn Fn(&UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> + Send + Sync>;

/// One row of the static registration table.
#[derive(Clone)]
pub struct Registration {
    /// Unique name within its registry
    pub name: String,
    /// Disabled units are skipped by `start_all`
    pub enabled: bool,
    /// Constructor
    pub factory: UnitFactory,
}

impl Registration {
    /// Create a registration from a constructor function.
    pub fn new<F>(name: impl Into<String>, enabled: bool, factory: F) -> Self
    where
        F: Fn(&UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            enabled,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish()
    }
}
