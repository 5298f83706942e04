//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens, keyed `vendor/model`. Custom
//! pricing can be added at runtime from the `[pricing]` config section.
//! A model with no entry has no cost; nothing here ever invents a zero.

use std::collections::HashMap;
use std::sync::RwLock;
use switchyard_core::{ModelPricing, ProviderKind};

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert("anthropic/claude-opus-4".into(), ModelPricing::new(15.0, 75.0));
        prices.insert("anthropic/claude-sonnet-4".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("anthropic/claude-3-7-sonnet".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("anthropic/claude-3-5-sonnet".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("anthropic/claude-3-5-haiku".into(), ModelPricing::new(0.8, 4.0));
        prices.insert("anthropic/claude-3-haiku".into(), ModelPricing::new(0.25, 1.25));

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert("openai/gpt-4o".into(), ModelPricing::new(2.5, 10.0));
        prices.insert("openai/gpt-4o-mini".into(), ModelPricing::new(0.15, 0.6));
        prices.insert("openai/gpt-4.1".into(), ModelPricing::new(2.0, 8.0));
        prices.insert("openai/gpt-4.1-mini".into(), ModelPricing::new(0.4, 1.6));
        prices.insert("openai/gpt-4.1-nano".into(), ModelPricing::new(0.1, 0.4));
        prices.insert("openai/o1".into(), ModelPricing::new(15.0, 60.0));
        prices.insert("openai/o1-mini".into(), ModelPricing::new(1.1, 4.4));
        prices.insert("openai/o3-mini".into(), ModelPricing::new(1.1, 4.4));

        // ── Google ─────────────────────────────────────────────────
        prices.insert("google/gemini-2.5-pro".into(), ModelPricing::new(1.25, 10.0));
        prices.insert("google/gemini-2.5-flash".into(), ModelPricing::new(0.3, 2.5));
        prices.insert("google/gemini-2.0-flash".into(), ModelPricing::new(0.1, 0.4));
        prices.insert("google/gemini-1.5-pro".into(), ModelPricing::new(1.25, 5.0));
        prices.insert("google/gemini-1.5-flash".into(), ModelPricing::new(0.075, 0.3));

        // ── Open-weight models (via OpenRouter) ────────────────────
        prices.insert("meta-llama/llama-3.1-405b".into(), ModelPricing::new(2.7, 2.7));
        prices.insert("meta-llama/llama-3.1-70b".into(), ModelPricing::new(0.52, 0.75));
        prices.insert("meta-llama/llama-3.1-8b".into(), ModelPricing::new(0.055, 0.055));
        prices.insert("mistral/mistral-large".into(), ModelPricing::new(2.0, 6.0));
        prices.insert("deepseek/deepseek-v3".into(), ModelPricing::new(0.27, 1.1));
        prices.insert("deepseek/deepseek-r1".into(), ModelPricing::new(0.55, 2.19));

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Look up pricing by exact key.
    pub fn get(&self, key: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        prices.get(key).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, key: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.insert(key.into(), pricing);
    }

    /// Find pricing for a model served by `provider`.
    ///
    /// Tries an exact `provider/model` key, then the model under its
    /// vendor (`openai/gpt-4o`; OpenRouter ids already carry the vendor).
    /// Failing that, a key from the same vendor matches when the rest of
    /// the model name is only a date or version tag, so
    /// `gpt-4o-mini-2024-07-18` is priced as `gpt-4o-mini` while `o1-pro`
    /// stays unpriced. Bedrock ids such as
    /// `us.anthropic.claude-sonnet-4-20250514-v1:0` are reduced to their
    /// bare model name first.
    pub fn lookup(&self, provider: ProviderKind, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());

        let vendor = match provider {
            ProviderKind::Openrouter => model.split_once('/').map(|(vendor, _)| vendor.to_lowercase()),
            _ => Some(provider.pricing_prefix().to_string()),
        };
        let mut candidates = vec![format!("{}/{}", provider.as_str(), model)];
        match provider {
            ProviderKind::Openrouter => candidates.push(model.to_string()),
            _ => candidates.push(format!("{}/{}", provider.pricing_prefix(), model)),
        }
        for key in &candidates {
            if let Some(p) = prices.get(key.as_str()) {
                return Some(*p);
            }
        }

        let bare_model = bare_model_name(model);
        let mut best: Option<(usize, ModelPricing)> = None;
        if let Some(vendor) = vendor {
            for (key, pricing) in prices.iter() {
                let Some((key_vendor, key_model)) = key.split_once('/') else {
                    continue;
                };
                let key_model = key_model.to_lowercase();
                if key_vendor.eq_ignore_ascii_case(&vendor)
                    && let Some(rest) = bare_model.strip_prefix(&key_model)
                    && is_version_tag(rest)
                    && best.is_none_or(|(len, _)| key_model.len() > len)
                {
                    best = Some((key_model.len(), *pricing));
                }
            }
        }

        if best.is_none() {
            tracing::debug!(provider = %provider, model, "No pricing for model");
        }
        best.map(|(_, p)| p)
    }

    /// List all known model keys, sorted.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Lowercased model name with any vendor path and Bedrock
/// `region.vendor.` prefix removed.
fn bare_model_name(model: &str) -> String {
    let lower = model.to_lowercase();
    let tail = lower.rsplit('/').next().unwrap_or(&lower);
    match tail.find("anthropic.") {
        Some(idx) => tail[idx + "anthropic.".len()..].to_string(),
        None => tail.to_string(),
    }
}

/// Whether `rest` (what follows a priced model name) only pins a
/// release: `-20241022`, `-2024-07-18`, `-latest`, `-001`, an optional
/// trailing `-v1:0`, or a Vertex-style `@...` tag.
fn is_version_tag(rest: &str) -> bool {
    if rest.is_empty() || rest.starts_with('@') {
        return true;
    }
    let Some(rest) = rest.strip_prefix('-') else {
        return false;
    };
    let segments: Vec<&str> = rest.split('-').collect();
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());

    let mut i = 0;
    if segments.first().is_some_and(|s| digits(s, 8) || digits(s, 3) || *s == "latest") {
        i = 1;
    } else if segments.len() >= 3 && digits(segments[0], 4) && digits(segments[1], 2) && digits(segments[2], 2) {
        i = 3;
    }
    if let Some(tag) = segments.get(i).and_then(|s| s.strip_prefix('v'))
        && !tag.is_empty()
        && tag.split(':').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    {
        i += 1;
    }
    i > 0 && i == segments.len()
}
