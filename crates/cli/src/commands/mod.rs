pub mod agent;
pub mod chat;
pub mod config_cmd;
pub mod providers;

use anyhow::Context;
use std::sync::Arc;
use switchyard_config::AppConfig;
use switchyard_core::{ProviderKind, StateSink};
use switchyard_gateway::ChatGateway;
use switchyard_store::{InMemoryStateSink, JsonlStateSink, NoopStateSink};
use tracing::debug;

/// Load and validate the config file plus environment overrides.
pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

/// The state sink selected by `store.backend`.
pub fn open_sink(config: &AppConfig) -> Arc<dyn StateSink> {
    debug!(backend = %config.store.backend, "Opening state sink");
    match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStateSink::new()),
        "none" => Arc::new(NoopStateSink),
        _ => Arc::new(JsonlStateSink::open(config.store_path())),
    }
}

pub fn build_gateway(config: &AppConfig) -> ChatGateway {
    ChatGateway::from_config(config, open_sink(config))
}

/// Parse a `--provider` value.
pub fn parse_provider(name: Option<&str>) -> anyhow::Result<Option<ProviderKind>> {
    name.map(str::parse::<ProviderKind>)
        .transpose()
        .context("Invalid --provider")
}
