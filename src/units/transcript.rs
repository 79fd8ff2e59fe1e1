//! `transcript` module: keeps running conversation statistics in `stats.*`.

use super::Subscriptions;
use colloquy_core::{Capability, Event, EventBus, Lifecycle, StateStore, Topic, UnitContext};
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "transcript";

pub struct Transcript {
    bus: EventBus,
    state: StateStore,
    subscriptions: Subscriptions,
}

impl Transcript {
    pub fn create(ctx: &UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> {
        Ok(Arc::new(Self {
            bus: ctx.bus.clone(),
            state: ctx.state.clone(),
            subscriptions: Subscriptions::default(),
        }))
    }

    fn bump(state: &StateStore, counter: &str) -> anyhow::Result<()> {
        let path = format!("stats.{counter}");
        let next = state.get_as::<u64>(&path).unwrap_or(0) + 1;
        state.set(&path, next)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Lifecycle for Transcript {
    async fn initialize(&self) -> Capability {
        for counter in ["exchanges", "errors", "cancelled"] {
            if let Err(e) = self.state.set(&format!("stats.{counter}"), 0) {
                return Some(Err(e.into()));
            }
        }

        let state = self.state.clone();
        self.subscriptions
            .push(self.bus.on(Topic::MessageCompleted, move |event| {
                Self::bump(&state, "exchanges")?;
                if let Event::MessageCompleted { processing_time_ms, .. } = event {
                    state.set("stats.lastProcessingTimeMs", *processing_time_ms)?;
                }
                Ok(())
            }));

        let state = self.state.clone();
        self.subscriptions
            .push(self.bus.on(Topic::MessageError, move |_| Self::bump(&state, "errors")));

        let state = self.state.clone();
        self.subscriptions
            .push(self.bus.on(Topic::MessageCancelled, move |_| {
                Self::bump(&state, "cancelled")
            }));

        let state = self.state.clone();
        self.subscriptions.push(self.bus.on(Topic::HistoryClear, move |_| {
            state.set("stats.exchanges", 0)?;
            Ok(())
        }));

        Some(Ok(()))
    }

    async fn health_check(&self) -> Capability {
        if self.subscriptions.is_empty() {
            return Some(Err(anyhow::anyhow!("not subscribed to message events")));
        }
        Some(Ok(()))
    }

    async fn destroy(&self) -> Capability {
        let detached = self.subscriptions.detach(&self.bus);
        debug!(detached, "Transcript detached");
        Some(Ok(()))
    }
}
