//! `colloquy ask`: one message, one answer.

use colloquy_core::{AppContext, MessageOutcome, SendOptions, ServiceType};

pub async fn run(ctx: &AppContext, text: &str, service: Option<ServiceType>) -> anyhow::Result<()> {
    let orchestrator = super::start(ctx).await?;

    let mut options = SendOptions::default();
    if let Some(service) = service {
        options = options.with_service_type(service);
    }
    let outcome = orchestrator.send_message(text, options).await;
    orchestrator.destroy().await?;

    match outcome? {
        Some(MessageOutcome::Completed { response, .. }) => {
            println!("{}", response.answer);
            Ok(())
        }
        Some(MessageOutcome::Failed { error, .. }) => anyhow::bail!(error),
        Some(MessageOutcome::Cancelled { message_id }) => {
            anyhow::bail!("message {message_id} was cancelled")
        }
        None => anyhow::bail!("nothing to send: the message is blank"),
    }
}
