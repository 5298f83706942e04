//! Provider router: one adapter per configured vendor, selected by kind.

use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{ProviderAdapter, ProviderKind};

use crate::anthropic::AnthropicAdapter;
use crate::bedrock::BedrockAdapter;
use crate::google::GoogleAdapter;
use crate::http::ProviderSettings;
use crate::openai_completions::OpenAiCompletionsAdapter;
use crate::openai_responses::OpenAiResponsesAdapter;
use crate::openrouter::OpenRouterAdapter;

/// Routes completion requests to the adapter for a provider kind.
pub struct ProviderRouter {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    default_provider: ProviderKind,
}

impl ProviderRouter {
    /// Create an empty router with a default provider.
    pub fn new(default_provider: ProviderKind) -> Self {
        Self {
            adapters: HashMap::new(),
            default_provider,
        }
    }

    /// Register an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    /// Get the default adapter.
    pub fn default(&self) -> Option<Arc<dyn ProviderAdapter>> {
        self.get(self.default_provider)
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Registered kinds, in declaration order.
    pub fn list(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.adapters.contains_key(k))
            .collect()
    }
}

/// Build an adapter for `kind` from its settings.
pub fn adapter_for(kind: ProviderKind, settings: ProviderSettings) -> Arc<dyn ProviderAdapter> {
    match kind {
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(settings)),
        ProviderKind::Bedrock => Arc::new(BedrockAdapter::new(settings)),
        ProviderKind::Google => Arc::new(GoogleAdapter::new(settings)),
        ProviderKind::OpenaiCompletions => Arc::new(OpenAiCompletionsAdapter::new(settings)),
        ProviderKind::OpenaiResponses => Arc::new(OpenAiResponsesAdapter::new(settings)),
        ProviderKind::Openrouter => Arc::new(OpenRouterAdapter::new(settings)),
    }
}

/// Build a router with every adapter registered.
///
/// Providers without a config section still get an adapter; it reports
/// `NotConfigured` on first use because it has no API key.
pub fn build_from_config(config: &switchyard_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(config.default_provider);
    for kind in ProviderKind::ALL {
        let settings = config
            .provider(kind)
            .map(ProviderSettings::from)
            .unwrap_or_else(|| ProviderSettings::new(""));
        router.register(adapter_for(kind, settings));
    }
    router
}
