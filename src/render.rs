//! Terminal presentation
//!
//! Follows the bus tap and prints what a chat user needs to see. Rendering
//! never feeds back into the core.

use colloquy_core::{Event, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Start printing bus events. The task ends when the bus is dropped or
/// after `system:destroyed`.
pub fn spawn(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = format_event(&event) {
                        println!("{line}");
                    }
                    if matches!(event, Event::SystemDestroyed) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Renderer fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Renderer stopped");
    })
}

/// One printable line for `event`, or `None` for events the user does not see.
pub fn format_event(event: &Event) -> Option<String> {
    match event {
        Event::MessageStarted { options, .. } => {
            let service = options
                .service_type
                .map(|s| s.as_str())
                .unwrap_or("general");
            Some(format!("… thinking ({service})"))
        }
        Event::MessageCompleted {
            response,
            processing_time_ms,
            ..
        } => {
            let mut line = format!("🤖 {}", response.answer);
            if let Some(confidence) = response.confidence {
                line.push_str(&format!("\n   confidence: {:.0}%", confidence * 100.0));
            }
            if !response.sources.is_empty() {
                line.push_str(&format!("\n   sources: {}", response.sources.join(", ")));
            }
            line.push_str(&format!("\n   ({processing_time_ms} ms)"));
            Some(line)
        }
        Event::MessageError { error, .. } => Some(format!("❌ {error}")),
        Event::MessageCancelled { message_id } => Some(format!("⏹  {message_id} cancelled")),
        Event::HistoryClear => Some("🧹 History cleared".to_string()),
        Event::SystemInitialized {
            init_time_ms,
            modules,
            services,
        } => Some(format!(
            "✅ Ready in {init_time_ms} ms (modules: {}; services: {})",
            list(modules),
            list(services)
        )),
        Event::SystemHealthCheck { passed, failed, results } => {
            let mut line = format!("🩺 Health: {passed} passed, {failed} failed");
            for result in results.iter().filter(|r| !r.healthy) {
                let reason = result.error.as_deref().unwrap_or("unhealthy");
                line.push_str(&format!("\n   {}:{} {reason}", result.kind, result.name));
            }
            Some(line)
        }
        Event::SystemError { source, message } => Some(format!("⚠️  {source}: {message}")),
        Event::SystemDestroyed => Some("👋 Bye".to_string()),
        _ => None,
    }
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::{ApiResponse, HealthResult, SendOptions, ServiceType};

    #[test]
    fn test_completed_shows_metadata() {
        let line = format_event(&Event::MessageCompleted {
            message_id: "msg-1".to_string(),
            response: ApiResponse::text("42 invoices")
                .with_confidence(0.87)
                .with_source("faktury.pdf"),
            processing_time_ms: 120,
        })
        .unwrap();

        assert!(line.starts_with("🤖 42 invoices"));
        assert!(line.contains("confidence: 87%"));
        assert!(line.contains("sources: faktury.pdf"));
        assert!(line.contains("(120 ms)"));
    }

    #[test]
    fn test_started_names_service() {
        let line = format_event(&Event::MessageStarted {
            message_id: "msg-1".to_string(),
            message: "select 1".to_string(),
            options: SendOptions::default().with_service_type(ServiceType::Sql),
        })
        .unwrap();
        assert!(line.contains("(sql)"));
    }

    #[test]
    fn test_health_lists_failures_only() {
        let line = format_event(&Event::SystemHealthCheck {
            passed: 1,
            failed: 1,
            results: vec![
                HealthResult::passed("typing", "module"),
                HealthResult::failed("api-monitor", "service", "backend unavailable"),
            ],
        })
        .unwrap();
        assert!(line.contains("1 passed, 1 failed"));
        assert!(line.contains("service:api-monitor backend unavailable"));
        assert!(!line.contains("typing"));
    }

    #[test]
    fn test_internal_events_are_silent() {
        assert!(format_event(&Event::MessageSubmit {
            text: "hej".to_string(),
            options: SendOptions::default(),
        })
        .is_none());
        assert!(format_event(&Event::ModuleLoaded {
            name: "typing".to_string()
        })
        .is_none());
    }
}
