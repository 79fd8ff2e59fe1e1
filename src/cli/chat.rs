//! `colloquy chat`: interactive session.
//!
//! Lines are published as `message:submit` so the session drives the core
//! through the same input topics as any other presentation layer.

use crate::{render, signals};
use anyhow::Context;
use colloquy_core::{AppContext, Event, Orchestrator, SendOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
Commands:
  /help     show this help
  /status   show system status
  /health   run a health check
  /cancel   cancel messages waiting for a reply
  /clear    clear the history
  /quit     leave";

enum Step {
    Continue,
    Quit,
}

pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let renderer = render::spawn(ctx.bus());
    let orchestrator = super::start(ctx).await?;
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session = %session_id, "Chat session started");
    println!("Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = signals::wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match handle_line(ctx, &orchestrator, &session_id, line.trim()).await {
                    Ok(Step::Continue) => {}
                    Ok(Step::Quit) => break,
                    Err(e) => println!("❌ {e}"),
                }
            }
        }
    }

    if orchestrator.has_unsaved_data() {
        warn!("Leaving with messages still waiting for a reply");
    }
    orchestrator.destroy().await?;
    if let Err(e) = renderer.await {
        warn!(error = %e, "Renderer task failed");
    }
    Ok(())
}

async fn handle_line(
    ctx: &AppContext,
    orchestrator: &Orchestrator,
    session_id: &str,
    line: &str,
) -> anyhow::Result<Step> {
    match line {
        "" => {}
        "/quit" | "/exit" => return Ok(Step::Quit),
        "/help" => println!("{HELP}"),
        "/clear" => {
            ctx.bus().emit(Event::HistoryClear);
        }
        "/health" => {
            // Printed by the renderer from system:health-check.
            orchestrator.health_check().await?;
        }
        "/cancel" => {
            let ids = orchestrator
                .pipeline()
                .map(|pipeline| pipeline.in_flight())
                .unwrap_or_default();
            if ids.is_empty() {
                println!("Nothing to cancel.");
            }
            for id in ids {
                orchestrator.cancel_message(&id)?;
            }
        }
        "/status" => {
            let status = orchestrator.status().await;
            println!(
                "{} {} [{}] up {}s | modules: {} | services: {} | in flight: {} | completed {} failed {}",
                status.app_name,
                status.environment,
                status.state,
                status.uptime_secs,
                status.modules.join(", "),
                status.services.join(", "),
                status.in_flight,
                status.pipeline.completed,
                status.pipeline.failed,
            );
            for failure in &status.failed_units {
                println!("  unavailable: {} ({})", failure.name, failure.error);
            }
        }
        command if command.starts_with('/') => {
            println!("Unknown command {command}. Type /help.");
        }
        text => {
            ctx.bus().emit(Event::MessageSubmit {
                text: text.to_string(),
                options: SendOptions::default().with_session_id(session_id),
            });
        }
    }
    Ok(Step::Continue)
}
