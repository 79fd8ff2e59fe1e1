use super::types::{Event, Topic};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Synchronous event handler.
///
/// Returning an error (or panicking) does not stop the remaining handlers of
/// the same emission; the failure is reported on [`Topic::SystemError`].
pub type Handler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to detach the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Inner {
    handlers: RwLock<HashMap<Topic, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<Event>,
    emitted: AtomicU64,
    failures: AtomicU64,
}

/// In-process publish/subscribe bus.
///
/// Handlers registered with [`on`](Self::on) run synchronously on the
/// emitting task, in subscription order. Emission works on a snapshot of the
/// handler list taken without holding the lock while handlers run, so a
/// handler may emit (even on the same topic), subscribe or unsubscribe.
///
/// Every event is additionally forwarded to a `tokio::broadcast` tap for
/// async consumers. Slow tap subscribers miss events (lagged) rather than
/// blocking the emitter.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a new EventBus whose broadcast tap buffers `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                tap,
                emitted: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Register a handler for `topic`.
    pub fn on<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(topic = %topic, subscription = %id, "Handler registered");
        id
    }

    /// Detach a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Forward an event to the tap, then to every handler of its topic.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: Event) -> usize {
        let topic = event.topic();
        self.inner.emitted.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<(SubscriptionId, Handler)> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        debug!(topic = %topic, handlers = snapshot.len(), "Emitting event");

        // Tap first so async consumers observe outer events before nested ones.
        let _ = self.inner.tap.send(event.clone());

        for (id, handler) in &snapshot {
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(payload) => Some(format!("handler panicked: {}", panic_message(&*payload))),
            };
            if let Some(message) = failure {
                self.report_failure(topic, *id, message);
            }
        }

        snapshot.len()
    }

    fn report_failure(&self, topic: Topic, id: SubscriptionId, message: String) {
        self.inner.failures.fetch_add(1, Ordering::Relaxed);
        error!(topic = %topic, subscription = %id, error = %message, "Event handler failed");

        // A failing error handler is only logged, otherwise reports would loop.
        if topic == Topic::SystemError {
            return;
        }
        self.emit(Event::SystemError {
            source: format!("handler:{topic}"),
            message,
        });
    }

    /// Subscribe to the broadcast tap. Receives every future event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.tap.subscribe()
    }

    /// Number of active tap subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.tap.receiver_count()
    }

    /// Number of synchronous handlers registered for `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Total events emitted since creation.
    #[must_use]
    pub fn emitted_count(&self) -> u64 {
        self.inner.emitted.load(Ordering::Relaxed)
    }

    /// Total handler failures since creation.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("emitted", &self.emitted_count())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
