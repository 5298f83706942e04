//! OpenAI Responses API adapter.
//!
//! Conversation turns are sent as `input` items. Tool calls and their
//! outputs are items of their own (`function_call`,
//! `function_call_output`), correlated by `call_id`. Streaming emits
//! `response.*` events and ends with `response.completed`, which carries
//! the full response body.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchyard_core::request::JSON_RESPONSE_TOOL;
use switchyard_core::{
    Citation, Content, ContentPart, EventStream, MediaSource, Message, ParsedCompletion,
    PreparedRequest, ProviderAdapter, ProviderError, ProviderKind, ProviderToolKind,
    ResponseFormat, Role, StreamEvent, StreamInterpreter, StreamStep, ToolCall, Usage,
};
use tracing::debug;

use crate::http::{self, ProviderSettings};
use crate::sse::SseDecoder;
use crate::stream::{append_text, decode_response, slot};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1";

const SUPPORTED_TOOLS: &[ProviderToolKind] = &[
    ProviderToolKind::WebSearch,
    ProviderToolKind::CodeExecution,
    ProviderToolKind::ImageGeneration,
];

pub struct OpenAiResponsesAdapter {
    settings: ProviderSettings,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiResponsesAdapter {
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
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(api_key)
            .json(payload))
    }

    fn input_part(part: &ContentPart) -> Option<Value> {
        match part {
            ContentPart::Text { text } => Some(json!({"type": "input_text", "text": text})),
            ContentPart::Image { source } => {
                Some(json!({"type": "input_image", "image_url": source.to_url()}))
            }
            ContentPart::File { source, filename } => Some(match source {
                MediaSource::Url { url } => json!({"type": "input_file", "file_url": url}),
                MediaSource::Base64 { .. } => json!({
                    "type": "input_file",
                    "filename": filename.clone().unwrap_or_else(|| "file".into()),
                    "file_data": source.to_url(),
                }),
            }),
            ContentPart::ToolCall(_) | ContentPart::ToolCallResult(_) => None,
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiResponsesAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenaiResponses
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
        let mut items = Vec::new();

        for msg in messages {
            let role = role_name(msg.role);
            let parts = match &msg.content {
                Content::Text(text) => {
                    items.push(json!({"role": role, "content": text}));
                    continue;
                }
                Content::Parts(parts) => parts,
            };

            match msg.role {
                Role::Assistant => {
                    let text = msg.text();
                    if !text.is_empty() {
                        items.push(json!({"role": "assistant", "content": text}));
                    }
                    for call in msg.tool_calls() {
                        let arguments = match &call.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        };
                        items.push(json!({
                            "type": "function_call",
                            "call_id": call.wire_id(),
                            "name": call.name,
                            "arguments": arguments,
                        }));
                    }
                }
                Role::User | Role::System => {
                    let mut content = Vec::new();
                    for part in parts {
                        match part {
                            ContentPart::ToolCallResult(result) => items.push(json!({
                                "type": "function_call_output",
                                "call_id": result.wire_id(),
                                "output": result.result_text(),
                            })),
                            ContentPart::ToolCall(_) => {
                                return Err(http::unsupported(self.kind(), "tool calls in user messages"));
                            }
                            other => content.extend(Self::input_part(other)),
                        }
                    }
                    if !content.is_empty() {
                        items.push(json!({"role": role, "content": content}));
                    }
                }
            }
        }
        Ok(json!(items))
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        self.check_provider_tools(&request.tools)?;
        let mut body = json!({
            "model": request.model,
            "input": self.format_messages(&request.messages)?,
            "temperature": request.temperature,
            "max_output_tokens": request.max_tokens,
        });
        if let Some(instructions) = request.system_prompt_with_format_hint() {
            body["instructions"] = json!(instructions);
        }

        let mut tools: Vec<Value> = request
            .developer_tools()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.arguments_schema,
                    "strict": false,
                })
            })
            .collect();
        for tool in request.provider_tools() {
            match tool.provider_kind() {
                Some(ProviderToolKind::WebSearch) => tools.push(json!({"type": "web_search_preview"})),
                Some(ProviderToolKind::CodeExecution) => tools.push(json!({
                    "type": "code_interpreter",
                    "container": {"type": "auto"},
                })),
                Some(ProviderToolKind::ImageGeneration) => {
                    tools.push(json!({"type": "image_generation"}));
                }
                None => {}
            }
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(name) = &request.tool_choice {
            body["tool_choice"] = json!({"type": "function", "name": name});
        }

        if request.response_format == ResponseFormat::Json {
            let format = match &request.response_schema {
                Some(schema) => json!({
                    "type": "json_schema",
                    "name": JSON_RESPONSE_TOOL,
                    "schema": schema,
                    "strict": false,
                }),
                None => json!({"type": "json_object"}),
            };
            body["text"] = json!({"format": format});
        }
        if request.stream {
            body["stream"] = json!(true);
        }
        Ok(body)
    }

    async fn send(&self, request: &PreparedRequest, payload: &Value) -> Result<Value, ProviderError> {
        debug!(provider = "openai_responses", model = %request.model, "Sending completion request");
        http::send_json(self.post(payload)?, self.kind()).await
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        debug!(provider = "openai_responses", model = %request.model, "Sending streaming request");
        let response = http::send_streaming(self.post(payload)?, self.kind()).await?;
        Ok(decode_response(response, SseDecoder::default()))
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion, ProviderError> {
        if body["status"] == "failed" || body["error"].is_object() {
            return Err(failed_response(&body["error"]));
        }
        let output = body["output"].as_array().ok_or_else(|| {
            ProviderError::InvalidResponse("Responses API body has no output array".into())
        })?;

        let mut parsed = ParsedCompletion::default();
        for item in output {
            match item["type"].as_str() {
                Some("message") => {
                    for content in item["content"].as_array().into_iter().flatten() {
                        if content["type"] != "output_text" {
                            continue;
                        }
                        parsed.text.push_str(content["text"].as_str().unwrap_or_default());
                        for annotation in content["annotations"].as_array().into_iter().flatten() {
                            if annotation["type"] == "url_citation"
                                && let Some(url) = annotation["url"].as_str()
                            {
                                parsed.citations.push(Citation {
                                    url: url.to_string(),
                                    title: annotation["title"].as_str().map(str::to_string),
                                });
                            }
                        }
                    }
                }
                Some("function_call") => {
                    let arguments = http::parse_arguments(item["arguments"].as_str().unwrap_or_default());
                    let mut call = ToolCall::new(item["name"].as_str().unwrap_or_default(), arguments);
                    if let Some(id) = item["call_id"].as_str() {
                        call = call.with_call_id(id);
                    }
                    parsed.tool_calls.push(call);
                }
                // web_search_call, reasoning, code_interpreter_call, ...
                _ => {}
            }
        }

        if body["usage"].is_object() {
            let usage = &body["usage"];
            parsed.usage = Some(Usage {
                prompt_tokens: http::as_u32(&usage["input_tokens"]),
                completion_tokens: http::as_u32(&usage["output_tokens"]),
                total_tokens: http::as_u32(&usage["total_tokens"]),
            });
        }
        parsed.finish_reason = body["incomplete_details"]["reason"]
            .as_str()
            .or_else(|| body["status"].as_str())
            .map(str::to_string);
        parsed.response_id = body["id"].as_str().map(str::to_string);
        parsed.model = body["model"].as_str().map(str::to_string);
        Ok(parsed.normalize())
    }

    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter> {
        Box::new(ResponsesStream::default())
    }
}

fn failed_response(error: &Value) -> ProviderError {
    let message = error["message"].as_str().unwrap_or("response failed").to_string();
    match error["code"].as_str() {
        Some("rate_limit_exceeded") => ProviderError::RateLimited { retry_after_secs: 5 },
        Some("server_error") | None => ProviderError::ApiError {
            status_code: 500,
            message,
        },
        Some(_) => ProviderError::ApiError {
            status_code: 400,
            message,
        },
    }
}

/// Rebuilds a Responses API body from `response.*` events.
struct ResponsesStream {
    response: Value,
}

impl Default for ResponsesStream {
    fn default() -> Self {
        Self {
            response: json!({"output": []}),
        }
    }
}

impl ResponsesStream {
    fn item(&mut self, data: &Value) -> Result<&mut Value, ProviderError> {
        let index = data["output_index"].as_u64().unwrap_or(0);
        slot(&mut self.response["output"], index)
    }

    fn content(&mut self, data: &Value) -> Result<&mut Value, ProviderError> {
        let index = data["content_index"].as_u64().unwrap_or(0);
        let item = self.item(data)?;
        slot(&mut item["content"], index)
    }
}

impl StreamInterpreter for ResponsesStream {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError> {
        if event.terminal {
            return Ok(StreamStep::end());
        }
        let data = &event.data;

        match event.event_type().unwrap_or_default() {
            "response.created" | "response.in_progress" => {
                self.response = data["response"].clone();
                if !self.response["output"].is_array() {
                    self.response["output"] = json!([]);
                }
            }
            "response.output_item.added" | "response.output_item.done" => {
                *self.item(data)? = data["item"].clone();
            }
            "response.content_part.added" => {
                *self.content(data)? = data["part"].clone();
            }
            "response.output_text.delta" => {
                let text = data["delta"].as_str().unwrap_or_default();
                let item = self.item(data)?;
                if item["type"].is_null() {
                    item["type"] = json!("message");
                }
                let part = self.content(data)?;
                part["type"] = json!("output_text");
                append_text(&mut part["text"], text);
                return Ok(StreamStep::delta(text));
            }
            "response.output_text.annotation.added" => {
                let part = self.content(data)?;
                if !part["annotations"].is_array() {
                    part["annotations"] = json!([]);
                }
                if let Some(list) = part["annotations"].as_array_mut() {
                    list.push(data["annotation"].clone());
                }
            }
            "response.function_call_arguments.delta" => {
                let fragment = data["delta"].as_str().unwrap_or_default();
                append_text(&mut self.item(data)?["arguments"], fragment);
            }
            "response.completed" | "response.incomplete" => {
                self.response = data["response"].clone();
                let reason = self.response["incomplete_details"]["reason"]
                    .as_str()
                    .or_else(|| self.response["status"].as_str())
                    .unwrap_or("completed")
                    .to_string();
                return Ok(StreamStep::finished(reason));
            }
            "response.failed" => return Err(failed_response(&data["response"]["error"])),
            "error" => return Err(failed_response(data)),
            _ => {}
        }
        Ok(StreamStep::default())
    }

    fn snapshot(&self) -> Value {
        self.response.clone()
    }
}
