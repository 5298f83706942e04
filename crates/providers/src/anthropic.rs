//! Anthropic Messages API adapter.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Hosted web search and code execution
//! - Streaming via SSE with typed `content_block_*` events

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use switchyard_core::{
    Citation, Content, ContentPart, EventStream, MediaSource, Message, ParsedCompletion, PreparedRequest,
    ProviderAdapter, ProviderError, ProviderKind, ProviderToolKind, Role, StreamEvent,
    StreamInterpreter, StreamStep, ToolCall, Usage,
};
use tracing::debug;

use crate::http::{self, ProviderSettings};
use crate::sse::SseDecoder;
use crate::stream::{append_text, decode_response, slot};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const CODE_EXECUTION_BETA: &str = "code-execution-2025-05-22";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const WEB_SEARCH_MAX_USES: u32 = 5;

const SUPPORTED_TOOLS: &[ProviderToolKind] =
    &[ProviderToolKind::WebSearch, ProviderToolKind::CodeExecution];

/// Anthropic native Messages API adapter.
pub struct AnthropicAdapter {
    settings: ProviderSettings,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            client: settings.client(),
            settings,
        }
    }

    fn content_blocks(parts: &[ContentPart]) -> Vec<ContentBlock> {
        parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
                ContentPart::Image { source } => ContentBlock::Image {
                    source: BlockSource::from(source),
                },
                ContentPart::File { source, filename } => ContentBlock::Document {
                    source: BlockSource::from(source),
                    title: filename.clone(),
                },
                ContentPart::ToolCall(call) => ContentBlock::ToolUse {
                    id: call.wire_id(),
                    name: call.name.clone(),
                    input: http::arguments_object(&call.arguments),
                },
                ContentPart::ToolCallResult(result) => ContentBlock::ToolResult {
                    tool_use_id: result.wire_id(),
                    content: result.result_text(),
                },
            })
            .collect()
    }

    /// Developer tools, the structured-output tool and any hosted tools.
    fn to_api_tools(&self, request: &PreparedRequest) -> Result<Vec<Value>, ProviderError> {
        let mut tools: Vec<Value> = request
            .function_tools()
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.arguments_schema,
                })
            })
            .collect();

        for tool in request.provider_tools() {
            let hosted = match tool.provider_kind() {
                Some(ProviderToolKind::WebSearch) => json!({
                    "type": "web_search_20250305",
                    "name": "web_search",
                    "max_uses": WEB_SEARCH_MAX_USES,
                }),
                Some(ProviderToolKind::CodeExecution) => json!({
                    "type": "code_execution_20250522",
                    "name": "code_execution",
                }),
                Some(other) => {
                    return Err(http::unsupported(self.kind(), format!("provider-managed tool '{other}'")));
                }
                None => continue,
            };
            tools.push(hosted);
        }
        Ok(tools)
    }

    fn post(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        let api_key = self.settings.require_key(self.kind())?;
        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload);

        let code_execution = request
            .provider_tools()
            .any(|t| t.provider_kind() == Some(ProviderToolKind::CodeExecution));
        if code_execution {
            builder = builder.header("anthropic-beta", CODE_EXECUTION_BETA);
        }
        Ok(builder)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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

    /// System messages are skipped here; they are hoisted into the
    /// top-level `system` field by `build_request_parameters`.
    fn format_messages(&self, messages: &[Message]) -> Result<Value, ProviderError> {
        let mut api_messages = Vec::with_capacity(messages.len());
        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => continue,
            };
            let content = match &msg.content {
                Content::Text(text) => AnthropicContent::Text(text.clone()),
                Content::Parts(parts) => AnthropicContent::Blocks(Self::content_blocks(parts)),
            };
            api_messages.push(AnthropicMessage { role, content });
        }
        serde_json::to_value(api_messages).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to encode Anthropic messages: {e}"))
        })
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        self.check_provider_tools(&request.tools)?;
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": self.format_messages(&request.messages)?,
        });

        let system: Vec<String> = request
            .system_prompt_with_format_hint()
            .into_iter()
            .chain(
                request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(Message::text),
            )
            .collect();
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        let tools = self.to_api_tools(request)?;
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(name) = request.forced_tool() {
            body["tool_choice"] = json!({"type": "tool", "name": name});
        }
        if request.stream {
            body["stream"] = json!(true);
        }
        Ok(body)
    }

    async fn send(&self, request: &PreparedRequest, payload: &Value) -> Result<Value, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");
        http::send_json(self.post(request, payload)?, self.kind()).await
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");
        let builder = self.post(request, payload)?.header("accept", "text/event-stream");
        let response = http::send_streaming(builder, self.kind()).await?;
        Ok(decode_response(response, SseDecoder::default()))
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion, ProviderError> {
        if body["type"] == "error" {
            return Err(stream_error(&body["error"]));
        }
        let blocks = body["content"].as_array().ok_or_else(|| {
            ProviderError::InvalidResponse("Anthropic response has no content array".into())
        })?;

        let mut parsed = ParsedCompletion::default();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    parsed.text.push_str(block["text"].as_str().unwrap_or_default());
                    for citation in block["citations"].as_array().into_iter().flatten() {
                        if let Some(url) = citation["url"].as_str() {
                            parsed.citations.push(Citation {
                                url: url.to_string(),
                                title: citation["title"].as_str().map(str::to_string),
                            });
                        }
                    }
                }
                Some("tool_use") => {
                    let name = block["name"].as_str().unwrap_or_default();
                    let mut call = ToolCall::new(name, block["input"].clone());
                    if let Some(id) = block["id"].as_str() {
                        call = call.with_call_id(id);
                    }
                    parsed.tool_calls.push(call);
                }
                // server_tool_use, web_search_tool_result, thinking, ...
                _ => {}
            }
        }

        if body["usage"].is_object() {
            let prompt = http::as_u32(&body["usage"]["input_tokens"]);
            let completion = http::as_u32(&body["usage"]["output_tokens"]);
            parsed.usage = Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt.saturating_add(completion),
            });
        }
        parsed.finish_reason = body["stop_reason"].as_str().map(str::to_string);
        parsed.response_id = body["id"].as_str().map(str::to_string);
        parsed.model = body["model"].as_str().map(str::to_string);
        Ok(parsed.normalize())
    }

    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter> {
        Box::new(AnthropicStream::default())
    }
}

/// Rebuilds a Messages API response body from stream events.
struct AnthropicStream {
    message: Value,
    partial_json: HashMap<u64, String>,
}

impl Default for AnthropicStream {
    fn default() -> Self {
        Self {
            message: json!({"content": []}),
            partial_json: HashMap::new(),
        }
    }
}

impl AnthropicStream {
    fn block_mut(&mut self, index: u64) -> Option<&mut Value> {
        let index = usize::try_from(index).ok()?;
        self.message["content"].as_array_mut()?.get_mut(index)
    }
}

impl StreamInterpreter for AnthropicStream {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError> {
        if event.terminal {
            return Ok(StreamStep::end());
        }
        let data = &event.data;
        let index = data["index"].as_u64().unwrap_or(0);

        match event.event_type().unwrap_or_default() {
            "message_start" => {
                self.message = data["message"].clone();
                if !self.message["content"].is_array() {
                    self.message["content"] = json!([]);
                }
            }
            "content_block_start" => {
                *slot(&mut self.message["content"], index)? = data["content_block"].clone();
            }
            "content_block_delta" => {
                let delta = &data["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        let text = delta["text"].as_str().unwrap_or_default();
                        if let Some(block) = self.block_mut(index) {
                            append_text(&mut block["text"], text);
                        }
                        return Ok(StreamStep::delta(text));
                    }
                    Some("input_json_delta") => {
                        self.partial_json
                            .entry(index)
                            .or_default()
                            .push_str(delta["partial_json"].as_str().unwrap_or_default());
                    }
                    Some("citations_delta") => {
                        if let Some(block) = self.block_mut(index) {
                            if !block["citations"].is_array() {
                                block["citations"] = json!([]);
                            }
                            if let Some(list) = block["citations"].as_array_mut() {
                                list.push(delta["citation"].clone());
                            }
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(raw) = self.partial_json.remove(&index)
                    && let Some(block) = self.block_mut(index)
                {
                    block["input"] = http::parse_arguments(&raw);
                }
            }
            "message_delta" => {
                if let Some(usage) = data["usage"].as_object() {
                    if !self.message["usage"].is_object() {
                        self.message["usage"] = json!({});
                    }
                    for (key, value) in usage {
                        self.message["usage"][key] = value.clone();
                    }
                }
                if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                    self.message["stop_reason"] = json!(reason);
                    return Ok(StreamStep::finished(reason));
                }
            }
            "message_stop" => return Ok(StreamStep::end()),
            "error" => return Err(stream_error(&data["error"])),
            _ => {}
        }
        Ok(StreamStep::default())
    }

    fn snapshot(&self) -> Value {
        self.message.clone()
    }
}

fn stream_error(error: &Value) -> ProviderError {
    let message = error["message"]
        .as_str()
        .unwrap_or("Anthropic stream error")
        .to_string();
    let status_code = match error["type"].as_str() {
        Some("rate_limit_error") => return ProviderError::RateLimited { retry_after_secs: 5 },
        Some("authentication_error") | Some("permission_error") => {
            return ProviderError::AuthenticationFailed(message);
        }
        Some("overloaded_error") => 529,
        Some("api_error") => 500,
        _ => 400,
    };
    ProviderError::ApiError {
        status_code,
        message,
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: BlockSource,
    },
    Document {
        source: BlockSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

impl From<&MediaSource> for BlockSource {
    fn from(source: &MediaSource) -> Self {
        match source {
            MediaSource::Url { url } => Self::Url { url: url.clone() },
            MediaSource::Base64 { media_type, data } => Self::Base64 {
                media_type: media_type.clone(),
                data: data.clone(),
            },
        }
    }
}
