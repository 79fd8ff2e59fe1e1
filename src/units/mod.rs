//! Built-in modules and services
//!
//! The static registration table: every unit is listed here by name with
//! its constructor, and enabled through `modules.<name>` / `services.<name>`.

pub mod api_monitor;
pub mod transcript;
pub mod typing;

use colloquy_core::{AppContext, EventBus, SubscriptionId};
use std::sync::Mutex;

/// Add every built-in unit to `ctx`.
pub fn install(ctx: AppContext) -> AppContext {
    ctx.module(transcript::NAME, transcript::Transcript::create)
        .module(typing::NAME, typing::TypingIndicator::create)
        .service(api_monitor::NAME, api_monitor::ApiMonitor::create)
}

/// Bus subscriptions owned by one unit, detached on destroy.
#[derive(Default)]
pub struct Subscriptions {
    ids: Mutex<Vec<SubscriptionId>>,
}

impl Subscriptions {
    pub fn push(&self, id: SubscriptionId) {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Detach everything from `bus`. Returns how many were attached.
    pub fn detach(&self, bus: &EventBus) -> usize {
        let ids: Vec<SubscriptionId> = self
            .ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        ids.into_iter().filter(|id| bus.off(*id)).count()
    }
}
