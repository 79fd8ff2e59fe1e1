//! `api-monitor` service: periodically probes the backend and publishes
//! availability under `api.*`.

use colloquy_core::{ApiClient, Capability, Lifecycle, StateStore, TimerSet, UnitContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NAME: &str = "api-monitor";

const DEFAULT_INTERVAL_SECS: u64 = 30;

pub struct ApiMonitor {
    state: StateStore,
    transport: Arc<dyn ApiClient>,
    timers: TimerSet,
    interval: Duration,
}

impl ApiMonitor {
    pub fn create(ctx: &UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> {
        let secs = ctx
            .config
            .get_u64("monitor.interval_secs")?
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        if secs == 0 {
            anyhow::bail!("monitor.interval_secs must be greater than zero");
        }
        Ok(Arc::new(Self {
            state: ctx.state.clone(),
            transport: ctx.transport.clone(),
            timers: ctx.timers.clone(),
            interval: Duration::from_secs(secs),
        }))
    }

    /// Probe once and record the result.
    async fn probe(state: &StateStore, transport: &dyn ApiClient) {
        let (online, error) = match transport.health_check().await {
            Ok(health) => (health.ok, None),
            Err(e) => (false, Some(e.user_message())),
        };

        let was_online = state.get_as::<bool>("api.online");
        if was_online != Some(online) {
            if online {
                info!(transport = transport.name(), "Backend online");
            } else {
                warn!(transport = transport.name(), error = ?error, "Backend offline");
            }
        }

        let writes = [
            state.set("api.online", online),
            state.set("api.lastCheckedAt", chrono::Utc::now().to_rfc3339()),
            state.set("api.lastError", error),
        ];
        for result in writes {
            if let Err(e) = result {
                debug!(error = %e, "Failed to record backend status");
            }
        }
    }
}

#[async_trait::async_trait]
impl Lifecycle for ApiMonitor {
    async fn initialize(&self) -> Capability {
        // An offline backend is reported by health checks, not a start failure.
        Self::probe(&self.state, self.transport.as_ref()).await;

        let state = self.state.clone();
        let transport = self.transport.clone();
        self.timers.interval(self.interval, move || {
            let state = state.clone();
            let transport = transport.clone();
            async move {
                Self::probe(&state, transport.as_ref()).await;
            }
        });
        Some(Ok(()))
    }

    async fn health_check(&self) -> Capability {
        match self.state.get_as::<bool>("api.online") {
            Some(true) => Some(Ok(())),
            _ => {
                let reason = self
                    .state
                    .get_as::<String>("api.lastError")
                    .unwrap_or_else(|| "backend reported not ok".to_string());
                Some(Err(anyhow::anyhow!("backend unavailable: {reason}")))
            }
        }
    }

    async fn destroy(&self) -> Capability {
        // Interval is owned by the unit timer set and cancelled with it.
        Some(self.state.set("api.online", false).map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::lifecycle::Collaborators;
    use colloquy_core::{EventBus, JsonConfig, MockApiClient, UnitKind};

    fn unit_context(transport: MockApiClient, config: JsonConfig) -> UnitContext {
        let bus = EventBus::default();
        Collaborators {
            state: StateStore::new(bus.clone()),
            bus,
            config: Arc::new(config),
            transport: Arc::new(transport),
        }
        .context(NAME, UnitKind::Service, TimerSet::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_backend_availability() {
        let transport = MockApiClient::new();
        let ctx = unit_context(
            transport.clone(),
            JsonConfig::empty().with("monitor.interval_secs", 5),
        );
        let unit = ApiMonitor::create(&ctx).unwrap();

        assert!(matches!(unit.initialize().await, Some(Ok(()))));
        assert_eq!(ctx.state.get_as::<bool>("api.online"), Some(true));
        assert!(matches!(unit.health_check().await, Some(Ok(()))));

        transport.set_healthy(false);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(ctx.state.get_as::<bool>("api.online"), Some(false));
        assert!(matches!(unit.health_check().await, Some(Err(_))));

        transport.set_healthy(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ctx.state.get_as::<bool>("api.online"), Some(true));

        unit.destroy().await;
        ctx.timers.cancel_all();
    }

    #[tokio::test]
    async fn test_offline_backend_does_not_fail_start() {
        let transport = MockApiClient::new();
        transport.set_healthy(false);
        let ctx = unit_context(transport, JsonConfig::empty());
        let unit = ApiMonitor::create(&ctx).unwrap();

        assert!(matches!(unit.initialize().await, Some(Ok(()))));
        let err = unit.health_check().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("backend unavailable"));
        ctx.timers.cancel_all();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let ctx = unit_context(
            MockApiClient::new(),
            JsonConfig::empty().with("monitor.interval_secs", 0),
        );
        assert!(ApiMonitor::create(&ctx).is_err());
    }
}
