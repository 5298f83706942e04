//! `switchyard providers`: list the provider adapters.

use switchyard_config::AppConfig;
use switchyard_core::ProviderAdapter;
use switchyard_providers::build_from_config;

use super::load_config;

pub fn run() -> anyhow::Result<()> {
    let config = load_config()?;
    let router = build_from_config(&config);

    println!();
    println!("  Providers (default: {})", router.default_provider());
    println!();
    for kind in router.list() {
        if let Some(adapter) = router.get(kind) {
            println!("{}", describe(adapter.as_ref(), &config));
        }
    }
    println!();
    println!("  Set API keys in ~/.switchyard/config.toml under [providers.<name>]");
    println!("  or with ANTHROPIC_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY,");
    println!("  OPENROUTER_API_KEY, AWS_BEARER_TOKEN_BEDROCK.");
    Ok(())
}

/// One table row: name, default model, key status, provider-managed tools.
pub fn describe(adapter: &dyn ProviderAdapter, config: &AppConfig) -> String {
    let kind = adapter.kind();
    let configured = config
        .provider(kind)
        .and_then(|p| p.api_key.as_deref())
        .is_some_and(|key| !key.is_empty());
    let tools = adapter
        .supported_provider_tools()
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>();
    format!(
        "  {:<20} {:<45} {:<8} {}",
        kind.as_str(),
        adapter.default_model(),
        if configured { "key set" } else { "no key" },
        if tools.is_empty() { "-".to_string() } else { tools.join(", ") }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_config::ProviderConfig;
    use switchyard_core::ProviderKind;

    #[test]
    fn lists_provider_tools_and_key_status() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("sk-ant".into()),
                ..ProviderConfig::default()
            },
        );
        let router = build_from_config(&config);

        let anthropic = router.get(ProviderKind::Anthropic).unwrap();
        let row = describe(anthropic.as_ref(), &config);
        assert!(row.contains("anthropic"));
        assert!(row.contains("key set"));
        assert!(row.contains("web_search"));

        let completions = router.get(ProviderKind::OpenaiCompletions).unwrap();
        let row = describe(completions.as_ref(), &config);
        assert!(row.contains("no key"));
        assert!(row.trim_end().ends_with('-'));
    }
}
