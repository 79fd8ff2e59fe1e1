//! MessagePipeline - turns a user utterance into an assistant reply
//!
//! ```text
//! submit(text)
//!   ├─ blank? ──────────────► ignored (no history, no events)
//!   ├─ append user message, track in-flight, emit message:started
//!   ├─ detect service type
//!   ├─ [sequential] wait for the dispatch slot
//!   ├─ transport.send_message  (timeout / cancellation)
//!   ├─ untrack in-flight, recompute chat.processing
//!   └─ message:completed | message:error | message:cancelled
//! ```
//!
//! In-flight state is keyed by message id, so `chat.processing` stays true
//! while any message is outstanding.

/// Capability detection.
pub mod detect;
/// Message and pipeline types.
pub mod types;

#[cfg(test)]
mod tests;

pub use detect::detect_service_type;
pub use types::{
    Message, MessageOutcome, MessagePhase, PipelineSettings, PipelineStats, QueueMode, Role,
    SendOptions, ServiceType,
};

use crate::error::Error;
use crate::event_bus::{Event, EventBus};
use crate::state::StateStore;
use crate::transport::error::strip_paths;
use crate::transport::{ApiClient, ApiResponse, TransportError};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State path of the chat history list
pub const HISTORY_PATH: &str = "chat.messages";
/// State path of the "any message in flight" flag
pub const PROCESSING_PATH: &str = "chat.processing";
/// State path mirroring in-flight message phases by id
pub const IN_FLIGHT_PATH: &str = "chat.inFlight";

struct InFlight {
    phase: MessagePhase,
    token: CancellationToken,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    total_processing_ms: AtomicU64,
}

struct Inner {
    bus: EventBus,
    state: StateStore,
    transport: Arc<dyn ApiClient>,
    settings: PipelineSettings,
    dispatch_slot: Semaphore,
    in_flight: DashMap<String, InFlight>,
    // Serializes in-flight map changes with the processing flag write.
    flag_lock: Mutex<()>,
    seq: AtomicU64,
    counters: Counters,
}

enum Dispatch {
    Done(Result<ApiResponse, TransportError>),
    Cancelled,
}

/// Message send pipeline. Cloning yields another handle to the same pipeline.
#[derive(Clone)]
pub struct MessagePipeline {
    inner: Arc<Inner>,
}

impl MessagePipeline {
    /// Create a pipeline writing to `state` and reporting on `bus`.
    #[must_use]
    pub fn new(
        bus: EventBus,
        state: StateStore,
        transport: Arc<dyn ApiClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                state,
                transport,
                settings,
                dispatch_slot: Semaphore::new(1),
                in_flight: DashMap::new(),
                flag_lock: Mutex::new(()),
                seq: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Submit a user message and wait for its terminal outcome.
    ///
    /// Blank or whitespace-only text is ignored and returns `None`. Transport
    /// failures are resolved into [`MessageOutcome::Failed`] and a
    /// `message:error` event; they are never returned as errors.
    pub async fn submit(&self, text: &str, options: SendOptions) -> Option<MessageOutcome> {
        let text = text.trim();
        if text.is_empty() {
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Ignoring blank message");
            return None;
        }

        let started = Instant::now();
        let message_id = self.next_id();
        let service_type = detect_service_type(text, options.service_type);
        let options = SendOptions {
            service_type: Some(service_type),
            ..options
        };

        self.record(&Message {
            metadata: options.metadata.clone(),
            ..Message::new(&message_id, Role::User, text)
        });

        let token = CancellationToken::new();
        self.track(&message_id, token.clone());
        let guard = InFlightGuard {
            pipeline: self,
            message_id: &message_id,
        };
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        info!(message_id = %message_id, service_type = %service_type, "Message submitted");

        self.inner.bus.emit(Event::MessageStarted {
            message_id: message_id.clone(),
            message: text.to_string(),
            options: options.clone(),
        });

        let dispatched = self.dispatch(&message_id, text, &options, &token).await;

        // The flag must be settled before the terminal event goes out.
        drop(guard);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match dispatched {
            Dispatch::Done(Ok(response)) => {
                self.complete(&message_id, service_type, response, elapsed_ms)
            }
            Dispatch::Done(Err(e)) => self.fail(&message_id, &e),
            Dispatch::Cancelled => {
                self.inner.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                info!(message_id = %message_id, "Message cancelled");
                self.inner.bus.emit(Event::MessageCancelled {
                    message_id: message_id.clone(),
                });
                MessageOutcome::Cancelled { message_id }
            }
        };

        Some(outcome)
    }

    async fn dispatch(
        &self,
        message_id: &str,
        text: &str,
        options: &SendOptions,
        token: &CancellationToken,
    ) -> Dispatch {
        let _permit = match self.inner.settings.queue_mode {
            QueueMode::Concurrent => None,
            QueueMode::Sequential => {
                tokio::select! {
                    _ = token.cancelled() => return Dispatch::Cancelled,
                    permit = self.inner.dispatch_slot.acquire() => permit.ok(),
                }
            }
        };

        self.set_phase(message_id, MessagePhase::Dispatched);

        let call = async {
            let send = self.inner.transport.send_message(text, options);
            match self.inner.settings.request_timeout {
                Some(limit) => tokio::time::timeout(limit, send)
                    .await
                    .unwrap_or(Err(TransportError::Timeout(limit))),
                None => send.await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Dispatch::Cancelled,
            result = call => Dispatch::Done(result),
        }
    }

    fn complete(
        &self,
        message_id: &str,
        service_type: ServiceType,
        response: ApiResponse,
        elapsed_ms: u64,
    ) -> MessageOutcome {
        let counters = &self.inner.counters;
        counters.completed.fetch_add(1, Ordering::Relaxed);
        counters.total_processing_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        info!(message_id, elapsed_ms, "Message completed");

        self.record(
            &Message::new(format!("{message_id}-reply"), Role::Assistant, &response.answer)
                .with_metadata(json!({
                    "replyTo": message_id,
                    "serviceType": service_type,
                    "confidence": response.confidence,
                    "sources": response.sources,
                    "processingTimeMs": elapsed_ms,
                })),
        );

        self.inner.bus.emit(Event::MessageCompleted {
            message_id: message_id.to_string(),
            response: response.clone(),
            processing_time_ms: elapsed_ms,
        });

        MessageOutcome::Completed {
            message_id: message_id.to_string(),
            response,
            processing_time_ms: elapsed_ms,
        }
    }

    fn fail(&self, message_id: &str, error: &TransportError) -> MessageOutcome {
        self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
        warn!(message_id, error = %error, retryable = error.is_retryable(), "Message failed");

        let shown = strip_paths(&error.user_message());
        self.record(
            &Message::new(format!("{message_id}-error"), Role::Error, &shown)
                .with_metadata(json!({ "replyTo": message_id })),
        );

        self.inner.bus.emit(Event::MessageError {
            message_id: message_id.to_string(),
            error: shown.clone(),
        });

        MessageOutcome::Failed {
            message_id: message_id.to_string(),
            error: shown,
        }
    }

    /// Cancel one in-flight message. Returns `false` if it is not in flight.
    pub fn cancel(&self, message_id: &str) -> bool {
        match self.inner.in_flight.get(message_id) {
            Some(entry) => {
                entry.token.cancel();
                debug!(message_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight message. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.inner.in_flight.iter() {
            entry.token.cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Empty the chat history. In-flight messages are not affected.
    pub fn clear_history(&self) {
        self.write(HISTORY_PATH, json!([]));
        info!("Chat history cleared");
    }

    /// Current chat history.
    #[must_use]
    pub fn history(&self) -> Vec<Message> {
        self.inner.state.get_as(HISTORY_PATH).unwrap_or_default()
    }

    /// Ids of messages currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> Vec<String> {
        self.inner
            .in_flight
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of messages currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Phase of an in-flight message; `None` once it has finished.
    #[must_use]
    pub fn phase(&self, message_id: &str) -> Option<MessagePhase> {
        self.inner.in_flight.get(message_id).map(|entry| entry.phase)
    }

    /// Whether any message is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        !self.inner.in_flight.is_empty()
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let c = &self.inner.counters;
        let completed = c.completed.load(Ordering::Relaxed);
        PipelineStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed,
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            avg_processing_time_ms: c
                .total_processing_ms
                .load(Ordering::Relaxed)
                .checked_div(completed)
                .unwrap_or(0),
        }
    }

    /// Dispatch policy in effect
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    fn next_id(&self) -> String {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("msg-{}-{}", Utc::now().timestamp_millis(), seq)
    }

    fn track(&self, message_id: &str, token: CancellationToken) {
        let _flag = self.inner.flag_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.in_flight.insert(
            message_id.to_string(),
            InFlight {
                phase: MessagePhase::Submitted,
                token,
            },
        );
        self.write(&in_flight_path(message_id), MessagePhase::Submitted.as_str());
        self.write(PROCESSING_PATH, true);
        self.inner.state.mark_dirty();
    }

    fn set_phase(&self, message_id: &str, phase: MessagePhase) {
        if let Some(mut entry) = self.inner.in_flight.get_mut(message_id) {
            entry.phase = phase;
        }
        self.write(&in_flight_path(message_id), phase.as_str());
    }

    fn untrack(&self, message_id: &str) {
        let _flag = self.inner.flag_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.in_flight.remove(message_id);
        if let Err(e) = self.inner.state.remove(&in_flight_path(message_id)) {
            warn!(message_id, error = %e, "Failed to clear in-flight entry");
        }
        let busy = !self.inner.in_flight.is_empty();
        self.write(PROCESSING_PATH, busy);
        if !busy {
            self.inner.state.mark_clean();
        }
    }

    fn record(&self, message: &Message) {
        let appended = serde_json::to_value(message)
            .map_err(Error::from)
            .and_then(|value| self.inner.state.append(HISTORY_PATH, value));
        if let Err(e) = appended {
            warn!(message_id = %message.id, error = %e, "Failed to record message");
        }
    }

    fn write(&self, path: &str, value: impl Into<Value>) {
        if let Err(e) = self.inner.state.set(path, value) {
            warn!(path, error = %e, "State write failed");
        }
    }
}

impl std::fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("queue_mode", &self.inner.settings.queue_mode)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

fn in_flight_path(message_id: &str) -> String {
    format!("{IN_FLIGHT_PATH}.{message_id}")
}

/// Untracks a message however `submit` exits, including when its future is
/// dropped mid-flight.
struct InFlightGuard<'a> {
    pipeline: &'a MessagePipeline,
    message_id: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.untrack(self.message_id);
    }
}
