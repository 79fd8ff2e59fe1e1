//! CLI module for Colloquy
//!
//! Provides commands:
//! - `chat`: interactive session (default)
//! - `ask`: send one message and print the answer
//! - `status`: start the system, print its status as JSON and stop

use crate::app::{self, AppConfig};
use clap::{Parser, Subcommand};
use colloquy_core::{AppContext, Orchestrator, ServiceType};

pub mod ask;
pub mod chat;
pub mod status;

/// Colloquy chat assistant client
#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(about = "Client-side orchestrator for a chat-style assistant")]
#[command(version)]
pub struct Cli {
    /// Use the built-in echo transport instead of the HTTP backend
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat session (default)
    Chat,
    /// Send one message and print the answer
    Ask {
        /// Message text
        text: String,
        /// Force the backend service (sql, erp, general)
        #[arg(long)]
        service: Option<ServiceType>,
    },
    /// Print system status as JSON
    Status,
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let ctx = app::build_context(&config, cli.offline)?;
    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat::run(&ctx).await,
        Commands::Ask { text, service } => ask::run(&ctx, &text, service).await,
        Commands::Status => status::run(&ctx).await,
    }
}

/// Initialize, logging the units that failed to start.
async fn start(ctx: &AppContext) -> anyhow::Result<Orchestrator> {
    let orchestrator = ctx.initialize().await?;
    for failure in orchestrator.status().await.failed_units {
        tracing::warn!(
            unit = %failure.name,
            stage = ?failure.stage,
            error = %failure.error,
            "Unit unavailable"
        );
    }
    Ok(orchestrator)
}
