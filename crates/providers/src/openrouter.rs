//! OpenRouter adapter.
//!
//! OpenRouter speaks the Chat Completions format with a few extensions:
//! attribution headers, opt-in usage accounting, and web search through
//! the `web` plugin.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchyard_core::{
    EventStream, Message, ParsedCompletion, PreparedRequest, ProviderAdapter, ProviderError,
    ProviderKind, ProviderToolKind, StreamInterpreter,
};
use tracing::debug;

use crate::chat_completions::{self, ChatCompletionsStream};
use crate::http::{self, ProviderSettings};
use crate::sse::SseDecoder;
use crate::stream::decode_response;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o";

const SUPPORTED_TOOLS: &[ProviderToolKind] = &[ProviderToolKind::WebSearch];

pub struct OpenRouterAdapter {
    settings: ProviderSettings,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            client: settings.client(),
            settings,
        }
    }

    fn post(&self, payload: &Value) -> Result<reqwest::RequestBuilder, ProviderError> {
        let api_key = self.settings.require_key(self.kind())?;
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(payload);
        if let Some(site_url) = &self.settings.site_url {
            builder = builder.header("HTTP-Referer", site_url);
        }
        if let Some(app_name) = &self.settings.app_name {
            builder = builder.header("X-Title", app_name);
        }
        Ok(builder)
    }
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openrouter
    }

    fn default_model(&self) -> &str {
        self.settings.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn default_temperature(&self) -> f32 {
        self.settings.default_temperature.unwrap_or(0.7)
    }

    fn default_max_tokens(&self) -> u32 {
        self.settings.default_max_tokens.unwrap_or(4096)
    }

    fn supported_provider_tools(&self) -> &[ProviderToolKind] {
        SUPPORTED_TOOLS
    }

    fn format_messages(&self, messages: &[Message]) -> Result<Value, ProviderError> {
        chat_completions::format_messages(self.kind(), messages)
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        self.check_provider_tools(&request.tools)?;
        let mut body = chat_completions::base_parameters(self.kind(), request, "max_tokens")?;
        body["usage"] = json!({"include": true});

        let mut plugins = Vec::new();
        for tool in request.provider_tools() {
            match tool.provider_kind() {
                Some(ProviderToolKind::WebSearch) => plugins.push(json!({"id": "web"})),
                Some(other) => {
                    return Err(http::unsupported(self.kind(), format!("provider-managed tool '{other}'")));
                }
                None => {}
            }
        }
        if !plugins.is_empty() {
            body["plugins"] = json!(plugins);
        }
        Ok(body)
    }

    async fn send(&self, request: &PreparedRequest, payload: &Value) -> Result<Value, ProviderError> {
        debug!(provider = "openrouter", model = %request.model, "Sending completion request");
        http::send_json(self.post(payload)?, self.kind()).await
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        debug!(provider = "openrouter", model = %request.model, "Sending streaming request");
        let response = http::send_streaming(self.post(payload)?, self.kind()).await?;
        Ok(decode_response(response, SseDecoder::default()))
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion, ProviderError> {
        chat_completions::parse_response(body)
    }

    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter> {
        Box::new(ChatCompletionsStream::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, prepared};
    use switchyard_core::ToolDefinition;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> ProviderSettings {
        let mut settings = ProviderSettings::new("or-key").with_base_url(base_url);
        settings.app_name = Some("switchyard".into());
        settings.site_url = Some("https://switchyard.dev".into());
        settings
    }

    #[test]
    fn web_search_becomes_plugin() {
        let adapter = OpenRouterAdapter::new(settings(DEFAULT_BASE_URL));
        let mut req = prepared(vec![Message::user("News today?")]);
        req.tools = vec![ToolDefinition::provider_managed(ProviderToolKind::WebSearch)];

        let body = adapter.build_request_parameters(&req).unwrap();
        assert_eq!(body["plugins"], json!([{"id": "web"}]));
        assert!(body.get("tools").is_none());
        assert_eq!(body["usage"]["include"], true);
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn code_execution_unsupported() {
        let adapter = OpenRouterAdapter::new(settings(DEFAULT_BASE_URL));
        let tools = vec![ToolDefinition::provider_managed(ProviderToolKind::CodeExecution)];
        assert!(matches!(
            adapter.check_provider_tools(&tools),
            Err(ProviderError::UnsupportedFeature { .. })
        ));
    }

    #[tokio::test]
    async fn sends_attribution_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("HTTP-Referer", "https://switchyard.dev"))
            .and(header("X-Title", "switchyard"))
            .and(body_partial_json(json!({"usage": {"include": true}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-1",
                "model": "openai/gpt-4o",
                "choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenRouterAdapter::new(settings(&server.uri()));
        let req = prepared(vec![Message::user("ping")]);
        let payload = adapter.build_request_parameters(&req).unwrap();
        let parsed = adapter.parse_response(&adapter.send(&req, &payload).await.unwrap()).unwrap();
        assert_eq!(parsed.text, "ok");
        assert_eq!(parsed.model.as_deref(), Some("openai/gpt-4o"));
    }

    #[tokio::test]
    async fn stream_error_chunk_is_reported() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"upstream failed\",\"code\":502}}\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = OpenRouterAdapter::new(settings(&server.uri()));
        let mut req = prepared(vec![Message::user("ping")]);
        req.stream = true;
        let stream = adapter.send_streaming(&req, &json!({})).await.unwrap();
        let err = drain(&adapter, stream).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 502, .. }));
    }
}
