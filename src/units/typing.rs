//! `typing` module: drives the `ui.typing` indicator from message events.
//!
//! The indicator turns on when a message starts and follows
//! `chat.processing` when one finishes, so it stays on while other
//! messages are still in flight. A stale guard re-syncs it if a terminal
//! event never arrives.

use super::Subscriptions;
use colloquy_core::{
    Capability, EventBus, Lifecycle, StateStore, TimerId, TimerSet, Topic, UnitContext,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub const NAME: &str = "typing";

const TYPING_PATH: &str = "ui.typing";
const PROCESSING_PATH: &str = "chat.processing";
const DEFAULT_STALE_SECS: u64 = 120;

pub struct TypingIndicator {
    bus: EventBus,
    state: StateStore,
    timers: TimerSet,
    stale_after: Duration,
    stale_guard: Arc<Mutex<Option<TimerId>>>,
    subscriptions: Subscriptions,
}

impl TypingIndicator {
    pub fn create(ctx: &UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> {
        let stale_secs = ctx
            .config
            .get_u64("typing.stale_secs")?
            .unwrap_or(DEFAULT_STALE_SECS);
        Ok(Arc::new(Self {
            bus: ctx.bus.clone(),
            state: ctx.state.clone(),
            timers: ctx.timers.clone(),
            stale_after: Duration::from_secs(stale_secs.max(1)),
            stale_guard: Arc::new(Mutex::new(None)),
            subscriptions: Subscriptions::default(),
        }))
    }

    fn sync(state: &StateStore) -> anyhow::Result<()> {
        let processing = state.get_as::<bool>(PROCESSING_PATH).unwrap_or(false);
        state.set(TYPING_PATH, processing)?;
        Ok(())
    }

    fn arm_stale_guard(&self) -> impl Fn() + Send + Sync + 'static {
        let state = self.state.clone();
        let timers = self.timers.clone();
        let guard = self.stale_guard.clone();
        let delay = self.stale_after;
        move || {
            if tokio::runtime::Handle::try_current().is_err() {
                return;
            }
            let state = state.clone();
            let id = timers.timeout(delay, move || async move {
                if let Err(e) = Self::sync(&state) {
                    warn!(error = %e, "Failed to re-sync typing indicator");
                }
            });
            let previous = guard.lock().unwrap_or_else(|e| e.into_inner()).replace(id);
            if let Some(previous) = previous {
                timers.cancel(previous);
            }
        }
    }
}

#[async_trait::async_trait]
impl Lifecycle for TypingIndicator {
    async fn initialize(&self) -> Capability {
        if let Err(e) = self.state.set(TYPING_PATH, false) {
            return Some(Err(e.into()));
        }

        let state = self.state.clone();
        let arm = self.arm_stale_guard();
        self.subscriptions
            .push(self.bus.on(Topic::MessageStarted, move |_| {
                state.set(TYPING_PATH, true)?;
                arm();
                Ok(())
            }));

        for topic in [
            Topic::MessageCompleted,
            Topic::MessageError,
            Topic::MessageCancelled,
        ] {
            let state = self.state.clone();
            self.subscriptions
                .push(self.bus.on(topic, move |_| Self::sync(&state)));
        }

        Some(Ok(()))
    }

    async fn destroy(&self) -> Capability {
        let detached = self.subscriptions.detach(&self.bus);
        if let Some(id) = self
            .stale_guard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.timers.cancel(id);
        }
        debug!(detached, "Typing indicator detached");
        Some(self.state.set(TYPING_PATH, false).map_err(Into::into))
    }
}
