//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! [`AppConfig`] is an explicit value handed to the gateway and agent at
//! construction time; nothing in the core reads global state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use switchyard_core::{FailureKind, ProviderKind};

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider used when a request names none
    #[serde(default = "default_provider")]
    pub default_provider: ProviderKind,

    /// Model used when a request names none (falls back to the
    /// provider's own default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// When false, the gateway skips every vendor call and returns no result
    #[serde(default = "default_true")]
    pub api_requests_enabled: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Provider-specific configurations, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Custom model pricing overrides (`provider/model` → pricing)
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverrideConfig>,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Anthropic
}
fn default_true() -> bool {
    true
}

/// Retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Failure kinds that trigger a retry
    #[serde(default = "default_retriable")]
    pub retriable: Vec<FailureKind>,
}

fn default_max_retries() -> u32 {
    2
}
fn default_base_delay_secs() -> u64 {
    3
}
fn default_max_delay_secs() -> u64 {
    30
}
fn default_retriable() -> Vec<FailureKind> {
    FailureKind::DEFAULT_RETRIABLE.to_vec()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            retriable: default_retriable(),
        }
    }
}

/// Streaming accumulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Buffered characters before the delta callback fires
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

fn default_flush_threshold() -> usize {
    25
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Replaces the built-in agent system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
        }
    }
}

/// Where completion records are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "jsonl", "memory" or "none"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// JSONL file path (defaults to `~/.switchyard/completions.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "jsonl".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// AWS region (Bedrock)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Sent as `X-Title` (OpenRouter)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    /// Sent as `HTTP-Referer` (OpenRouter)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Per-request transport timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("region", &self.region)
            .field("app_name", &self.app_name)
            .field("site_url", &self.site_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

/// Environment variables holding each provider's API key, in priority order.
fn api_key_vars(kind: ProviderKind) -> &'static [&'static str] {
    match kind {
        ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
        ProviderKind::Bedrock => &["AWS_BEARER_TOKEN_BEDROCK"],
        ProviderKind::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        ProviderKind::OpenaiCompletions | ProviderKind::OpenaiResponses => &["OPENAI_API_KEY"],
        ProviderKind::Openrouter => &["OPENROUTER_API_KEY"],
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml),
    /// then apply environment overrides:
    /// - `SWITCHYARD_PROVIDER`, `SWITCHYARD_MODEL`
    /// - `SWITCHYARD_API_REQUESTS_ENABLED`
    /// - vendor API keys (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, ...)
    /// - `AWS_REGION` for Bedrock
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Config-file values for
    /// API keys win over the environment; provider/model switches win over
    /// the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("SWITCHYARD_PROVIDER") {
            self.default_provider = provider
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("SWITCHYARD_PROVIDER: {e}")))?;
        }

        if let Some(model) = lookup("SWITCHYARD_MODEL") {
            self.default_model = Some(model);
        }

        if let Some(flag) = lookup("SWITCHYARD_API_REQUESTS_ENABLED") {
            self.api_requests_enabled = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "SWITCHYARD_API_REQUESTS_ENABLED must be a boolean (got '{other}')"
                    )));
                }
            };
        }

        for kind in ProviderKind::ALL {
            let key = api_key_vars(kind).iter().find_map(|var| lookup(var));
            let region = match kind {
                ProviderKind::Bedrock => lookup("AWS_REGION"),
                _ => None,
            };
            if key.is_none() && region.is_none() {
                continue;
            }
            let entry = self.providers.entry(kind.as_str().to_string()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = key;
            }
            if entry.region.is_none() {
                entry.region = region;
            }
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Path of the JSONL completion store.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("completions.jsonl"))
    }

    /// Settings for one provider, if configured.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(kind.as_str())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, provider) in &self.providers {
            name.parse::<ProviderKind>().map_err(|_| {
                ConfigError::ValidationError(format!("unknown provider section '{name}'"))
            })?;
            if let Some(t) = provider.default_temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}.default_temperature must be between 0.0 and 2.0"
                )));
            }
        }

        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_secs must be >= retry.base_delay_secs".into(),
            ));
        }

        if self.streaming.flush_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "streaming.flush_threshold must be > 0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "jsonl" | "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be one of jsonl, memory, none (got '{}')",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: None,
            api_requests_enabled: true,
            retry: RetryConfig::default(),
            streaming: StreamingConfig::default(),
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
            providers: HashMap::new(),
            pricing: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, ProviderKind::Anthropic);
        assert!(config.api_requests_enabled);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_secs, 3);
        assert_eq!(config.retry.max_delay_secs, 30);
        assert_eq!(config.streaming.flush_threshold, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.retry.retriable, config.retry.retriable);
    }

    #[test]
    fn parses_provider_sections() {
        let config = AppConfig::from_toml_str(
            r#"
default_provider = "openrouter"
api_requests_enabled = false

[retry]
max_retries = 4
retriable = ["timeout", "rate_limited"]

[providers.openrouter]
api_key = "sk-or-test"
default_model = "openai/gpt-4o"
app_name = "switchyard"

[pricing."openrouter/openai/gpt-4o"]
input_per_m = 2.5
output_per_m = 10.0
"#,
        )
        .unwrap();

        assert_eq!(config.default_provider, ProviderKind::Openrouter);
        assert!(!config.api_requests_enabled);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(
            config.retry.retriable,
            vec![FailureKind::Timeout, FailureKind::RateLimited]
        );
        let provider = config.provider(ProviderKind::Openrouter).unwrap();
        assert_eq!(provider.default_model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(config.pricing.len(), 1);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                default_temperature: Some(5.0),
                ..ProviderConfig::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_section_rejected() {
        let err = AppConfig::from_toml_str("[providers.cohere]\napi_key = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn delay_bounds_checked() {
        let mut config = AppConfig::default();
        config.retry.base_delay_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, ProviderKind::Anthropic);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = \"google\"\n[agent]\nmax_iterations = 3").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, ProviderKind::Google);
        assert_eq!(config.agent.max_iterations, 3);
    }

    #[test]
    fn parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref path, .. } if path == file.path()));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("SWITCHYARD_PROVIDER", "gemini"),
                ("SWITCHYARD_MODEL", "gemini-2.0-flash"),
                ("SWITCHYARD_API_REQUESTS_ENABLED", "false"),
                ("GOOGLE_API_KEY", "g-key"),
                ("AWS_REGION", "eu-west-1"),
            ]))
            .unwrap();

        assert_eq!(config.default_provider, ProviderKind::Google);
        assert_eq!(config.default_model.as_deref(), Some("gemini-2.0-flash"));
        assert!(!config.api_requests_enabled);
        assert_eq!(
            config.provider(ProviderKind::Google).unwrap().api_key.as_deref(),
            Some("g-key")
        );
        let bedrock = config.provider(ProviderKind::Bedrock).unwrap();
        assert_eq!(bedrock.region.as_deref(), Some("eu-west-1"));
        assert!(bedrock.api_key.is_none());
        assert!(config.provider(ProviderKind::Anthropic).is_none());
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("from-file".into()),
                ..ProviderConfig::default()
            },
        );
        config
            .apply_env(env(&[("ANTHROPIC_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(
            config.provider(ProviderKind::Anthropic).unwrap().api_key.as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn bad_env_flag_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("SWITCHYARD_API_REQUESTS_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn debug_redacts_api_keys() {
        let provider = ProviderConfig {
            api_key: Some("sk-secret".into()),
            ..ProviderConfig::default()
        };
        let out = format!("{provider:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("anthropic"));
        assert!(toml_str.contains("flush_threshold"));
    }
}
