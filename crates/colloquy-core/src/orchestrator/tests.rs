use super::*;
use crate::config::JsonConfig;
use crate::error::Error;
use crate::event_bus::{Event, Topic};
use crate::lifecycle::{Capability, Lifecycle, UnitContext};
use crate::pipeline::{MessageOutcome, SendOptions};
use crate::transport::{MockApiClient, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Failing;

#[async_trait::async_trait]
impl Lifecycle for Failing {
    async fn initialize(&self) -> Capability {
        Some(Err(anyhow::anyhow!("cannot open resource")))
    }
}

/// Counts lifecycle calls.
struct Counted {
    inits: Arc<AtomicUsize>,
    destroys: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Lifecycle for Counted {
    async fn initialize(&self) -> Capability {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Some(Ok(()))
    }

    async fn health_check(&self) -> Capability {
        Some(Ok(()))
    }

    async fn destroy(&self) -> Capability {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Some(Ok(()))
    }
}

fn counted(inits: &Arc<AtomicUsize>, destroys: &Arc<AtomicUsize>) -> impl Fn(&UnitContext) -> anyhow::Result<Arc<dyn Lifecycle>> + Send + Sync + 'static {
    let inits = inits.clone();
    let destroys = destroys.clone();
    move |_ctx| {
        Ok(Arc::new(Counted {
            inits: inits.clone(),
            destroys: destroys.clone(),
        }) as Arc<dyn Lifecycle>)
    }
}

fn context(config: JsonConfig, mock: MockApiClient) -> AppContext {
    AppContext::new(Arc::new(config), Arc::new(mock))
}

fn record(bus: &crate::event_bus::EventBus, topic: Topic) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    bus.on(topic, move |event| {
        s.lock().unwrap().push(event.clone());
        Ok(())
    });
    seen
}

#[tokio::test]
async fn test_failing_module_does_not_abort_initialize() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let ctx = context(JsonConfig::empty(), MockApiClient::new())
        .module("broken", |_ctx| Ok(Arc::new(Failing) as Arc<dyn Lifecycle>))
        .service("monitor", counted(&inits, &destroys));
    let health = record(ctx.bus(), Topic::SystemHealthCheck);
    let initialized = record(ctx.bus(), Topic::SystemInitialized);

    let orchestrator = ctx.initialize().await.unwrap();

    assert_eq!(orchestrator.state(), LifecycleState::Ready);
    match &health.lock().unwrap()[0] {
        Event::SystemHealthCheck { failed, passed, .. } => {
            assert!(*failed >= 1);
            assert_eq!(*passed, 1);
        }
        other => panic!("expected SystemHealthCheck, got: {:?}", other),
    }
    match &initialized.lock().unwrap()[0] {
        Event::SystemInitialized { modules, services, .. } => {
            assert!(modules.is_empty());
            assert_eq!(services, &vec!["monitor".to_string()]);
        }
        other => panic!("expected SystemInitialized, got: {:?}", other),
    }

    let status = orchestrator.status().await;
    assert_eq!(status.failed_units.len(), 1);
    assert_eq!(status.failed_units[0].name, "broken");
    assert_eq!(status.modules.len(), 0);
    assert_eq!(status.services, vec!["monitor"]);
}

#[tokio::test]
async fn test_initialize_twice_is_a_noop() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let ctx = context(JsonConfig::empty(), MockApiClient::new())
        .module("transcript", counted(&inits, &destroys));
    let initialized = record(ctx.bus(), Topic::SystemInitialized);

    let first = ctx.initialize().await.unwrap();
    let second = first.initialize().await.unwrap();

    assert!(Orchestrator::ptr_eq(&first, &second));
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(first.modules().await.len(), 1);
    assert_eq!(initialized.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_one_live_instance_per_context() {
    let ctx = context(JsonConfig::empty(), MockApiClient::new());
    let a = ctx.orchestrator().unwrap();
    let b = ctx.orchestrator().unwrap();
    assert!(Orchestrator::ptr_eq(&a, &b));

    a.initialize().await.unwrap();
    a.destroy().await.unwrap();
    assert!(ctx.current().is_none());

    let c = ctx.orchestrator().unwrap();
    assert!(!Orchestrator::ptr_eq(&a, &c));
    assert_eq!(c.state(), LifecycleState::Uninitialized);
}

#[tokio::test]
async fn test_concurrent_destroy_tears_down_once() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let ctx = context(JsonConfig::empty(), MockApiClient::new())
        .module("transcript", counted(&inits, &destroys))
        .service("monitor", counted(&inits, &destroys));
    let destroyed = record(ctx.bus(), Topic::SystemDestroyed);

    let orchestrator = ctx.initialize().await.unwrap();
    let (a, b) = tokio::join!(orchestrator.destroy(), orchestrator.destroy());
    a.unwrap();
    b.unwrap();

    assert_eq!(destroys.load(Ordering::SeqCst), 2);
    assert_eq!(destroyed.lock().unwrap().len(), 1);
    assert_eq!(orchestrator.state(), LifecycleState::Destroyed);
    assert!(orchestrator.modules().await.is_empty());
    assert!(orchestrator.services().await.is_empty());

    // Already destroyed: no second teardown.
    orchestrator.destroy().await.unwrap();
    assert_eq!(destroys.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_submit_accepted_before_teardown_never_reaches_transport() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let mock = MockApiClient::new();
    let ctx = context(JsonConfig::empty(), mock.clone())
        .module("transcript", counted(&inits, &destroys));
    let started = record(ctx.bus(), Topic::MessageStarted);
    let orchestrator = ctx.initialize().await.unwrap();

    // Accepted while ready; the send task only runs once destroy yields.
    ctx.bus().emit(Event::MessageSubmit {
        text: "late".to_string(),
        options: SendOptions::default(),
    });
    orchestrator.destroy().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(mock.calls().is_empty());
    assert!(started.lock().unwrap().is_empty());
    assert!(orchestrator.pipeline().unwrap().history().is_empty());
    assert_eq!(orchestrator.state(), LifecycleState::Destroyed);
}

#[tokio::test]
async fn test_submit_during_teardown_is_ignored() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let mock = MockApiClient::new();
    let ctx = context(JsonConfig::empty(), mock.clone())
        .module("transcript", counted(&inits, &destroys));
    let orchestrator = ctx.initialize().await.unwrap();

    let teardown = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.destroy().await }
    });
    while orchestrator.state() == LifecycleState::Ready {
        tokio::task::yield_now().await;
    }
    assert_eq!(orchestrator.state(), LifecycleState::Destroying);

    let handlers = ctx.bus().emit(Event::MessageSubmit {
        text: "too late".to_string(),
        options: SendOptions::default(),
    });
    assert_eq!(handlers, 0);

    teardown.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(mock.calls().is_empty());
    assert!(orchestrator.pipeline().unwrap().history().is_empty());
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_restart_waits_for_running_teardown() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let ctx = context(JsonConfig::empty(), MockApiClient::new())
        .module("transcript", counted(&inits, &destroys));
    let first = ctx.initialize().await.unwrap();

    let (destroyed, restarted) = tokio::join!(first.destroy(), async {
        tokio::task::yield_now().await;
        ctx.restart().await
    });
    destroyed.unwrap();
    let second = restarted.unwrap();

    assert!(!Orchestrator::ptr_eq(&first, &second));
    assert_eq!(first.state(), LifecycleState::Destroyed);
    assert_eq!(second.state(), LifecycleState::Ready);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
    assert_eq!(inits.load(Ordering::SeqCst), 2);
    assert!(Orchestrator::ptr_eq(&ctx.current().unwrap(), &second));
}

#[tokio::test]
async fn test_lifecycle_misuse() {
    let ctx = context(JsonConfig::empty(), MockApiClient::new());
    let orchestrator = ctx.orchestrator().unwrap();

    assert!(matches!(
        orchestrator.destroy().await,
        Err(Error::InvalidLifecycle { operation: "destroy", state: LifecycleState::Uninitialized })
    ));
    assert!(matches!(
        orchestrator.send_message("hi", SendOptions::default()).await,
        Err(Error::NotReady)
    ));

    orchestrator.initialize().await.unwrap();
    orchestrator.destroy().await.unwrap();

    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(err, Error::InvalidLifecycle { operation: "initialize", .. }));
    assert!(err.to_string().contains("destroyed"));
    assert!(orchestrator.health_check().await.is_err());
}

#[tokio::test]
async fn test_core_failure_is_fatal_and_recoverable() {
    let ctx = context(
        JsonConfig::empty().with("pipeline.queue_mode", "burst"),
        MockApiClient::new(),
    );
    let orchestrator = ctx.orchestrator().unwrap();

    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
    assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);
    assert!(orchestrator.pipeline().is_none());
}

#[tokio::test]
async fn test_send_message_and_processing_flag() {
    let mock = MockApiClient::new();
    mock.push_error(TransportError::Network("connection refused".into()));
    let ctx = context(JsonConfig::empty(), mock);
    let orchestrator = ctx.initialize().await.unwrap();

    let failed = orchestrator
        .send_message("pierwsze", SendOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(failed, MessageOutcome::Failed { .. }));
    assert_eq!(ctx.state().get("chat.processing"), Some(serde_json::json!(false)));

    let completed = orchestrator
        .send_message("drugie", SendOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(completed, MessageOutcome::Completed { .. }));
    assert_eq!(ctx.state().get("chat.processing"), Some(serde_json::json!(false)));
    assert!(!orchestrator.has_unsaved_data());

    assert!(orchestrator
        .send_message("  ", SendOptions::default())
        .await
        .unwrap()
        .is_none());
    assert_eq!(orchestrator.status().await.pipeline.rejected, 1);
}

#[tokio::test]
async fn test_input_topics_reach_pipeline() {
    let ctx = context(JsonConfig::empty(), MockApiClient::new());
    let orchestrator = ctx.initialize().await.unwrap();
    let mut tap = ctx.bus().subscribe();

    ctx.bus().emit(Event::MessageSubmit {
        text: "cześć".to_string(),
        options: SendOptions::default(),
    });

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Event::MessageCompleted { response, .. }) = tap.recv().await {
                return response;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed.answer, "echo: cześć");
    assert_eq!(orchestrator.pipeline().unwrap().history().len(), 2);

    ctx.bus().emit(Event::HistoryClear);
    assert!(orchestrator.pipeline().unwrap().history().is_empty());

    ctx.bus().emit(Event::SystemError {
        source: "module:typing".to_string(),
        message: "render failed".to_string(),
    });
    assert_eq!(orchestrator.status().await.errors_reported, 1);

    // Listeners are detached on destroy.
    orchestrator.destroy().await.unwrap();
    assert_eq!(ctx.bus().handler_count(Topic::MessageSubmit), 0);
    assert_eq!(ctx.bus().handler_count(Topic::HistoryClear), 0);
}

#[tokio::test]
async fn test_api_health_included_when_configured() {
    let mock = MockApiClient::new();
    mock.set_healthy(false);
    let ctx = context(JsonConfig::empty().with("system.check_api_health", true), mock);

    let orchestrator = ctx.initialize().await.unwrap();
    let report = orchestrator.health_check().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.details[0].kind, "api");
    assert_eq!(
        orchestrator.status().await.last_health.map(|r| r.failed),
        Some(1)
    );
}

#[tokio::test(start_paused = true)]
async fn test_periodic_health_check() {
    let ctx = context(
        JsonConfig::empty().with("system.health_check_interval_secs", 30),
        MockApiClient::new(),
    );
    let health = record(ctx.bus(), Topic::SystemHealthCheck);
    let orchestrator = ctx.initialize().await.unwrap();
    assert_eq!(health.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(health.lock().unwrap().len(), 3);

    orchestrator.destroy().await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(health.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_restart_builds_fresh_instance() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let ctx = context(JsonConfig::empty(), MockApiClient::new())
        .module("transcript", counted(&inits, &destroys));

    let first = ctx.initialize().await.unwrap();
    let second = ctx.restart().await.unwrap();

    assert!(!Orchestrator::ptr_eq(&first, &second));
    assert_eq!(first.state(), LifecycleState::Destroyed);
    assert_eq!(second.state(), LifecycleState::Ready);
    assert_eq!(inits.load(Ordering::SeqCst), 2);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
    assert!(Orchestrator::ptr_eq(&ctx.current().unwrap(), &second));
}

#[tokio::test]
async fn test_disabled_unit_from_config() {
    let inits = Arc::new(AtomicUsize::new(0));
    let destroys = Arc::new(AtomicUsize::new(0));
    let ctx = context(
        JsonConfig::empty().with("modules.typing", false),
        MockApiClient::new(),
    )
    .module("typing", counted(&inits, &destroys))
    .module("transcript", counted(&inits, &destroys));

    let orchestrator = ctx.initialize().await.unwrap();
    assert_eq!(orchestrator.modules().await, vec!["transcript"]);
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_units_rejected_at_build() {
    let ctx = context(JsonConfig::empty(), MockApiClient::new())
        .module("transcript", |_ctx| Ok(Arc::new(Failing) as Arc<dyn Lifecycle>))
        .module("transcript", |_ctx| Ok(Arc::new(Failing) as Arc<dyn Lifecycle>));

    assert!(matches!(
        ctx.orchestrator(),
        Err(Error::DuplicateUnit { kind: "module", .. })
    ));
}
