//! Shared HTTP plumbing for the adapters: connection settings, transport
//! error mapping, and status-code classification.

use std::time::Duration;
use switchyard_config::ProviderConfig;
use switchyard_core::ProviderKind;
use switchyard_core::error::ProviderError;
use tracing::warn;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Connection and default-parameter settings for one adapter.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    /// Overrides the vendor's public endpoint (proxies, tests)
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub default_temperature: Option<f32>,
    pub default_max_tokens: Option<u32>,
    pub region: Option<String>,
    pub app_name: Option<String>,
    pub site_url: Option<String>,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            default_temperature: None,
            default_max_tokens: None,
            region: None,
            app_name: None,
            site_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default.trim_end_matches('/').to_string())
    }

    pub(crate) fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .unwrap_or_default()
    }

    /// The API key, or `NotConfigured` when none was supplied.
    pub(crate) fn require_key(&self, provider: ProviderKind) -> Result<&str, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "no API key configured for {provider}"
            )));
        }
        Ok(&self.api_key)
    }
}

impl From<&ProviderConfig> for ProviderSettings {
    fn from(config: &ProviderConfig) -> Self {
        let mut settings = Self::new(config.api_key.clone().unwrap_or_default());
        if let Some(url) = &config.api_url {
            settings = settings.with_base_url(url);
        }
        settings.default_model = config.default_model.clone();
        settings.default_temperature = config.default_temperature;
        settings.default_max_tokens = config.default_max_tokens;
        settings.region = config.region.clone();
        settings.app_name = config.app_name.clone();
        settings.site_url = config.site_url.clone();
        if let Some(secs) = config.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
        settings
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Map a reqwest failure to a transport error.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Send a request and decode a JSON response body.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    provider: ProviderKind,
) -> Result<serde_json::Value, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    let response = check_status(response, provider).await?;
    let status = response.status().as_u16();
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(format!(
        "{provider} returned a non-JSON body (status {status}): {e}"
    )))
}

/// Send a request whose body will be consumed as a stream.
pub(crate) async fn send_streaming(
    request: reqwest::RequestBuilder,
    provider: ProviderKind,
) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    check_status(response, provider).await
}

/// Classify non-success statuses: 429 ⇒ rate limited, 401/403 ⇒ auth,
/// anything else ⇒ `ApiError` carrying the status (5xx is a server error).
async fn check_status(
    response: reqwest::Response,
    provider: ProviderKind,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.unwrap_or_default();
    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(format!(
            "{provider} rejected the credentials: {}",
            error_message(&body)
        )));
    }

    warn!(provider = %provider, status, body = %body, "Provider API error");
    Err(ProviderError::ApiError {
        status_code: status,
        message: error_message(&body),
    })
}

/// Pull a human-readable message out of a vendor error body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    value["error"]["message"]
        .as_str()
        .or_else(|| value["message"].as_str())
        .or_else(|| value["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Decode a JSON-encoded tool-argument string. Malformed arguments are
/// kept as a string so schema validation downstream can report them.
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Guess an image MIME type from a URL's extension.
pub(crate) fn mime_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "image/jpeg",
    }
}

/// An `UnsupportedFeature` error for `provider`.
pub(crate) fn unsupported(provider: ProviderKind, feature: impl Into<String>) -> ProviderError {
    ProviderError::UnsupportedFeature {
        provider: provider.to_string(),
        feature: feature.into(),
    }
}

/// Tool-call arguments as a JSON object. Vendors reject anything else, so
/// malformed arguments replayed from history are sent as an empty object.
pub(crate) fn arguments_object(arguments: &serde_json::Value) -> serde_json::Value {
    if arguments.is_object() {
        arguments.clone()
    } else {
        serde_json::json!({})
    }
}

pub(crate) fn as_u32(value: &serde_json::Value) -> u32 {
    value.as_u64().map(|v| v.min(u32::MAX as u64) as u32).unwrap_or(0)
}
