//! `colloquy status`: start, report, stop.

use anyhow::Context;
use colloquy_core::AppContext;

pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let orchestrator = super::start(ctx).await?;
    let status = orchestrator.status().await;
    orchestrator.destroy().await?;

    let json = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
    println!("{json}");
    Ok(())
}
