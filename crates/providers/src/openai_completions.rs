//! OpenAI Chat Completions adapter.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchyard_core::{
    EventStream, Message, ParsedCompletion, PreparedRequest, ProviderAdapter, ProviderError,
    ProviderKind, StreamInterpreter,
};
use tracing::debug;

use crate::chat_completions::{self, ChatCompletionsStream};
use crate::http::{self, ProviderSettings};
use crate::sse::SseDecoder;
use crate::stream::decode_response;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiCompletionsAdapter {
    settings: ProviderSettings,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompletionsAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            client: settings.client(),
            settings,
        }
    }

    fn post(&self, payload: &Value) -> Result<reqwest::RequestBuilder, ProviderError> {
        let api_key = self.settings.require_key(self.kind())?;
        Ok(self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(payload))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompletionsAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenaiCompletions
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

    fn format_messages(&self, messages: &[Message]) -> Result<Value, ProviderError> {
        chat_completions::format_messages(self.kind(), messages)
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        self.check_provider_tools(&request.tools)?;
        let mut body = chat_completions::base_parameters(self.kind(), request, "max_completion_tokens")?;
        if request.stream {
            body["stream_options"] = json!({"include_usage": true});
        }
        Ok(body)
    }

    async fn send(&self, request: &PreparedRequest, payload: &Value) -> Result<Value, ProviderError> {
        debug!(provider = "openai_completions", model = %request.model, "Sending completion request");
        http::send_json(self.post(payload)?, self.kind()).await
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        debug!(provider = "openai_completions", model = %request.model, "Sending streaming request");
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
