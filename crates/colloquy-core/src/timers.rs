//! Owned timer registry
//!
//! Every interval or timeout a component starts is tracked in its own
//! [`TimerSet`] and cancelled individually on teardown. A set only ever
//! cancels timers it created.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identifier of a timer inside its [`TimerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Collection of timers owned by one component.
///
/// Timers run as tokio tasks, so they must be started from within a runtime.
#[derive(Clone, Default)]
pub struct TimerSet {
    timers: Arc<Mutex<HashMap<TimerId, CancellationToken>>>,
    next_id: Arc<AtomicU64>,
}

impl TimerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self) -> (TimerId, CancellationToken) {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, token.clone());
        (id, token)
    }

    /// Run `tick` every `period`, first after one full period.
    pub fn interval<F, Fut>(&self, period: Duration, mut tick: F) -> TimerId
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (id, token) = self.track();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
            debug!(timer = %id, "Interval stopped");
        });
        id
    }

    /// Run `fire` once after `delay`. The timer untracks itself when it fires.
    pub fn timeout<F, Fut>(&self, delay: Duration, fire: F) -> TimerId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (id, token) = self.track();
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    timers.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                    fire().await;
                }
            }
        });
        id
    }

    /// Cancel one timer. Returns `false` if it is unknown or already done.
    pub fn cancel(&self, id: TimerId) -> bool {
        let token = self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer in this set. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(TimerId, CancellationToken)> = self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (id, token) in &drained {
            token.cancel();
            debug!(timer = %id, "Timer cancelled");
        }
        drained.len()
    }

    /// Number of live timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no timer is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TimerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSet").field("live", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticks_until_cancelled() {
        let timers = TimerSet::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let t = ticks.clone();
        let id = timers.interval(Duration::from_secs(1), move || {
            let t = t.clone();
            async move {
                t.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once_and_untracks() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        timers.timeout(Duration::from_millis(200), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_only_touches_own_timers() {
        let mine = TimerSet::new();
        let theirs = TimerSet::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for set in [&mine, &theirs] {
            let f = fired.clone();
            set.timeout(Duration::from_secs(1), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(mine.cancel_all(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(mine.is_empty());
    }
}
