//! Configuration loading
//!
//! Layers, lowest priority first: the defaults compiled into the binary,
//! `config/default`, `config/<COLLOQUY_ENV>`, `config/local`, then
//! `COLLOQUY_*` variables (`COLLOQUY_API__BASE_URL` sets `api.base_url`).

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

const ENV_PREFIX: &str = "COLLOQUY";
const DEFAULT_ENVIRONMENT: &str = "development";

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let environment = std::env::var(format!("{ENV_PREFIX}_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());

    layered(&environment, variables())
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Overlay file stems for `environment`, in the order they apply.
fn overlay_files(environment: &str) -> Vec<String> {
    ["default", environment, "local"]
        .iter()
        .map(|stem| format!("config/{stem}"))
        .collect()
}

fn variables() -> Environment {
    // Single `_` after the prefix, `__` between nested keys.
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn layered(environment: &str, variables: Environment) -> ConfigBuilder<DefaultState> {
    let builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
    overlay_files(environment)
        .into_iter()
        .fold(builder, |builder, name| {
            builder.add_source(File::with_name(&name).required(false))
        })
        .add_source(variables)
}
