use super::*;
use crate::event_bus::Topic;
use crate::transport::MockApiClient;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

fn pipeline_with(mock: MockApiClient, settings: PipelineSettings) -> (MessagePipeline, EventBus, StateStore) {
    let bus = EventBus::default();
    let state = StateStore::new(bus.clone());
    let pipeline = MessagePipeline::new(bus.clone(), state.clone(), Arc::new(mock), settings);
    (pipeline, bus, state)
}

fn pipeline(mock: MockApiClient) -> (MessagePipeline, EventBus, StateStore) {
    pipeline_with(mock, PipelineSettings::default())
}

fn record_topic(bus: &EventBus, topic: Topic) -> Arc<StdMutex<Vec<Event>>> {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let s = seen.clone();
    bus.on(topic, move |event| {
        s.lock().unwrap().push(event.clone());
        Ok(())
    });
    seen
}

#[tokio::test]
async fn test_blank_submissions_are_ignored() {
    let mock = MockApiClient::new();
    let (pipeline, bus, state) = pipeline(mock.clone());
    let started = record_topic(&bus, Topic::MessageStarted);

    assert!(pipeline.submit("", SendOptions::default()).await.is_none());
    assert!(pipeline.submit("   \n\t", SendOptions::default()).await.is_none());

    assert!(started.lock().unwrap().is_empty());
    assert!(pipeline.history().is_empty());
    assert_eq!(state.get(HISTORY_PATH), None);
    assert!(mock.calls().is_empty());
    assert_eq!(pipeline.stats().rejected, 2);
    assert_eq!(pipeline.stats().submitted, 0);
}

#[tokio::test]
async fn test_completed_message_flow() {
    let mock = MockApiClient::new();
    mock.push_reply(
        ApiResponse::text("Użyj SELECT z klauzulą WHERE")
            .with_confidence(0.9)
            .with_source("docs/sql.md"),
    );
    let (pipeline, bus, state) = pipeline(mock.clone());

    let processing_at_completion = Arc::new(StdMutex::new(None));
    let p = processing_at_completion.clone();
    let reader = state.clone();
    bus.on(Topic::MessageCompleted, move |_| {
        *p.lock().unwrap() = reader.get(PROCESSING_PATH);
        Ok(())
    });
    let started = record_topic(&bus, Topic::MessageStarted);

    let outcome = pipeline
        .submit("SELECT * FROM faktury", SendOptions::default())
        .await
        .unwrap();

    let MessageOutcome::Completed { message_id, response, .. } = &outcome else {
        panic!("expected Completed, got: {:?}", outcome);
    };
    assert!(message_id.starts_with("msg-"));
    assert_eq!(response.confidence, Some(0.9));
    assert_eq!(*processing_at_completion.lock().unwrap(), Some(json!(false)));
    assert!(!state.has_unsaved_data());

    match &started.lock().unwrap()[0] {
        Event::MessageStarted { options, message, .. } => {
            assert_eq!(options.service_type, Some(ServiceType::Sql));
            assert_eq!(message, "SELECT * FROM faktury");
        }
        other => panic!("expected MessageStarted, got: {:?}", other),
    }
    assert_eq!(mock.calls()[0].1.service_type, Some(ServiceType::Sql));

    let history = pipeline.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    let meta = history[1].metadata.as_ref().unwrap();
    assert_eq!(meta["serviceType"], "sql");
    assert_eq!(meta["sources"], json!(["docs/sql.md"]));

    let stats = pipeline.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_failed_message_flow() {
    let mock = MockApiClient::new();
    mock.push_error(TransportError::Api {
        status: 500,
        message: "panic in /srv/backend/src/handler.py".to_string(),
    });
    let (pipeline, bus, state) = pipeline(mock);

    let processing_at_error = Arc::new(StdMutex::new(None));
    let p = processing_at_error.clone();
    let reader = state.clone();
    bus.on(Topic::MessageError, move |_| {
        *p.lock().unwrap() = reader.get(PROCESSING_PATH);
        Ok(())
    });

    let outcome = pipeline
        .submit("jak skonfigurować moduł ERP", SendOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.phase(), MessagePhase::Failed);
    assert_eq!(*processing_at_error.lock().unwrap(), Some(json!(false)));

    let history = pipeline.history();
    let last = history.last().unwrap();
    assert_eq!(last.role, Role::Error);
    assert!(last.content.contains("[PATH]"));
    assert!(!last.content.contains("/srv/backend"));
    assert_eq!(pipeline.stats().failed, 1);
}

#[tokio::test]
async fn test_forced_service_type_reaches_transport() {
    let mock = MockApiClient::new();
    let (pipeline, _, _) = pipeline(mock.clone());

    pipeline
        .submit(
            "SELECT 1",
            SendOptions::default()
                .with_service_type(ServiceType::General)
                .with_session_id("s-1"),
        )
        .await;

    let (text, options) = &mock.calls()[0];
    assert_eq!(text, "SELECT 1");
    assert_eq!(options.service_type, Some(ServiceType::General));
    assert_eq!(options.session_id.as_deref(), Some("s-1"));
}

#[tokio::test(start_paused = true)]
async fn test_processing_stays_true_while_any_message_in_flight() {
    let mock = MockApiClient::new().with_delay(Duration::from_millis(100));
    let (pipeline, _, state) = pipeline(mock);

    let first = tokio::spawn({
        let p = pipeline.clone();
        async move { p.submit("pierwsza", SendOptions::default()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = tokio::spawn({
        let p = pipeline.clone();
        async move { p.submit("druga", SendOptions::default()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(pipeline.in_flight_count(), 2);
    assert!(state.has_unsaved_data());

    first.await.unwrap().unwrap();
    assert_eq!(state.get(PROCESSING_PATH), Some(json!(true)));
    assert!(pipeline.is_processing());

    second.await.unwrap().unwrap();
    assert_eq!(state.get(PROCESSING_PATH), Some(json!(false)));
    assert_eq!(state.get(IN_FLIGHT_PATH), Some(json!({})));
    assert!(!state.has_unsaved_data());
}

#[tokio::test(start_paused = true)]
async fn test_sequential_mode_dispatches_one_at_a_time() {
    let mock = MockApiClient::new().with_delay(Duration::from_millis(100));
    let settings = PipelineSettings {
        queue_mode: QueueMode::Sequential,
        request_timeout: None,
    };
    let (pipeline, _, _) = pipeline_with(mock.clone(), settings);

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|text| {
            let p = pipeline.clone();
            tokio::spawn(async move { p.submit(text, SendOptions::default()).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(mock.calls().len(), 1);
    let phases: Vec<_> = pipeline
        .in_flight()
        .iter()
        .filter_map(|id| pipeline.phase(id))
        .collect();
    assert!(phases.contains(&MessagePhase::Submitted));
    assert!(phases.contains(&MessagePhase::Dispatched));

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_fails_message() {
    let mock = MockApiClient::new().with_delay(Duration::from_secs(30));
    let settings = PipelineSettings {
        queue_mode: QueueMode::Concurrent,
        request_timeout: Some(Duration::from_secs(5)),
    };
    let (pipeline, bus, _) = pipeline_with(mock, settings);
    let errors = record_topic(&bus, Topic::MessageError);

    let outcome = pipeline.submit("hello", SendOptions::default()).await.unwrap();

    match outcome {
        MessageOutcome::Failed { error, .. } => assert!(error.contains("5 seconds")),
        other => panic!("expected Failed, got: {:?}", other),
    }
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_message() {
    let mock = MockApiClient::new().with_delay(Duration::from_secs(10));
    let (pipeline, bus, state) = pipeline(mock);
    let cancelled = record_topic(&bus, Topic::MessageCancelled);

    let handle = tokio::spawn({
        let p = pipeline.clone();
        async move { p.submit("long question", SendOptions::default()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let id = pipeline.in_flight().pop().unwrap();
    assert!(pipeline.cancel(&id));
    let outcome = handle.await.unwrap().unwrap();

    assert_eq!(outcome, MessageOutcome::Cancelled { message_id: id.clone() });
    assert_eq!(cancelled.lock().unwrap()[0].message_id(), Some(id.as_str()));
    assert_eq!(state.get(PROCESSING_PATH), Some(json!(false)));
    assert!(!pipeline.cancel(&id));
    assert_eq!(pipeline.stats().cancelled, 1);
}

#[tokio::test]
async fn test_clear_history_and_unique_ids() {
    let (pipeline, _, _) = pipeline(MockApiClient::new());

    let a = pipeline.submit("one", SendOptions::default()).await.unwrap();
    let b = pipeline.submit("two", SendOptions::default()).await.unwrap();
    assert_ne!(a.message_id(), b.message_id());
    assert_eq!(pipeline.history().len(), 4);
    assert_eq!(pipeline.history()[1].content, "echo: one");

    pipeline.clear_history();
    assert!(pipeline.history().is_empty());
}
