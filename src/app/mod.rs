//! Application wiring
//!
//! Turns the loaded [`AppConfig`] into an [`AppContext`]: picks the transport
//! and installs the static unit table.

pub mod config;
pub mod loader;

pub use config::AppConfig;
pub use loader::load_config;

use anyhow::{Context, Result};
use colloquy_api::HttpApiClient;
use colloquy_core::{ApiClient, AppContext, MockApiClient};
use std::sync::Arc;
use tracing::info;

/// Build the process context. `offline` swaps the HTTP transport for the
/// scripted echo transport.
pub fn build_context(config: &AppConfig, offline: bool) -> Result<AppContext> {
    let transport: Arc<dyn ApiClient> = if offline {
        info!("Offline mode: using the echo transport");
        Arc::new(MockApiClient::new())
    } else {
        let api = config.api_config();
        info!(base_url = %api.base_url, "Using HTTP transport");
        Arc::new(HttpApiClient::new(api).context("Failed to create HTTP transport")?)
    };

    let provider = config.to_provider()?;
    Ok(crate::units::install(AppContext::new(Arc::new(provider), transport)))
}
