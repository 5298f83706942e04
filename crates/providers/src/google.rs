//! Google Gemini (`generateContent`) adapter.
//!
//! Gemini calls the assistant role `model`, carries the system prompt in
//! `systemInstruction`, and coerces structured output natively through
//! `generationConfig.responseSchema`. Function calls carry no correlation
//! id, so results are matched back by name.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use switchyard_core::{
    Citation, Content, ContentPart, EventStream, MediaSource, Message, ParsedCompletion,
    PreparedRequest, ProviderAdapter, ProviderError, ProviderKind, ProviderToolKind,
    ResponseFormat, Role, StreamEvent, StreamInterpreter, StreamStep, ToolCall, Usage,
};
use tracing::debug;

use crate::http::{self, ProviderSettings};
use crate::sse::SseDecoder;
use crate::stream::{append_text, decode_response};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const SUPPORTED_TOOLS: &[ProviderToolKind] =
    &[ProviderToolKind::WebSearch, ProviderToolKind::CodeExecution];

/// Schema keywords the Gemini API rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["additionalProperties", "$schema"];

pub struct GoogleAdapter {
    settings: ProviderSettings,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            client: settings.client(),
            settings,
        }
    }

    fn post(&self, model: &str, method: &str, payload: &Value) -> Result<reqwest::RequestBuilder, ProviderError> {
        let api_key = self.settings.require_key(self.kind())?;
        Ok(self
            .client
            .post(format!("{}/v1beta/models/{model}:{method}", self.base_url))
            .header("x-goog-api-key", api_key)
            .json(payload))
    }

    fn part(part: &ContentPart) -> Value {
        match part {
            ContentPart::Text { text } => json!({"text": text}),
            ContentPart::Image { source } | ContentPart::File { source, .. } => match source {
                MediaSource::Url { url } => json!({
                    "fileData": {"mimeType": http::mime_from_url(url), "fileUri": url},
                }),
                MediaSource::Base64 { media_type, data } => json!({
                    "inlineData": {"mimeType": media_type, "data": data},
                }),
            },
            ContentPart::ToolCall(call) => json!({
                "functionCall": {"name": call.name, "args": http::arguments_object(&call.arguments)},
            }),
            ContentPart::ToolCallResult(result) => {
                let response = match &result.result {
                    Value::Object(_) => result.result.clone(),
                    other => json!({"result": other}),
                };
                json!({"functionResponse": {"name": result.name, "response": response}})
            }
        }
    }
}

/// Strip schema keywords Gemini does not accept, recursively.
pub(crate) fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize_schema(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
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
        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|msg| {
                let role = if msg.role == Role::Assistant { "model" } else { "user" };
                let parts: Vec<Value> = match &msg.content {
                    Content::Text(text) => vec![json!({"text": text})],
                    Content::Parts(parts) => parts.iter().map(Self::part).collect(),
                };
                json!({"role": role, "parts": parts})
            })
            .collect();
        Ok(json!(contents))
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        self.check_provider_tools(&request.tools)?;
        let mut generation = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        });
        if request.response_format == ResponseFormat::Json {
            generation["responseMimeType"] = json!("application/json");
            if let Some(schema) = &request.response_schema {
                generation["responseSchema"] = sanitize_schema(schema);
            }
        }

        let mut body = json!({
            "contents": self.format_messages(&request.messages)?,
            "generationConfig": generation,
        });

        let system: Vec<Value> = request
            .system_prompt_with_format_hint()
            .into_iter()
            .chain(
                request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(Message::text),
            )
            .map(|text| json!({"text": text}))
            .collect();
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": system});
        }

        let declarations: Vec<Value> = request
            .developer_tools()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": sanitize_schema(&t.arguments_schema),
                })
            })
            .collect();
        let mut tools = Vec::new();
        if !declarations.is_empty() {
            tools.push(json!({"functionDeclarations": declarations}));
        }
        for tool in request.provider_tools() {
            match tool.provider_kind() {
                Some(ProviderToolKind::WebSearch) => tools.push(json!({"google_search": {}})),
                Some(ProviderToolKind::CodeExecution) => tools.push(json!({"code_execution": {}})),
                Some(other) => {
                    return Err(http::unsupported(self.kind(), format!("provider-managed tool '{other}'")));
                }
                None => {}
            }
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(name) = &request.tool_choice {
            body["toolConfig"] = json!({
                "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]},
            });
        }
        Ok(body)
    }

    async fn send(&self, request: &PreparedRequest, payload: &Value) -> Result<Value, ProviderError> {
        debug!(provider = "google", model = %request.model, "Sending completion request");
        let builder = self.post(&request.model, "generateContent", payload)?;
        http::send_json(builder, self.kind()).await
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        debug!(provider = "google", model = %request.model, "Sending streaming request");
        let builder = self.post(&request.model, "streamGenerateContent", payload)?.query(&[("alt", "sse")]);
        let response = http::send_streaming(builder, self.kind()).await?;
        Ok(decode_response(response, SseDecoder::default()))
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion, ProviderError> {
        if body["error"].is_object() {
            return Err(body_error(&body["error"]));
        }
        let candidate = &body["candidates"][0];
        if !candidate.is_object() {
            if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
                return Err(ProviderError::ApiError {
                    status_code: 400,
                    message: format!("prompt blocked: {reason}"),
                });
            }
            return Err(ProviderError::InvalidResponse("Gemini response has no candidates".into()));
        }

        let mut parsed = ParsedCompletion::default();
        for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
            if part["thought"] == true {
                continue;
            }
            if let Some(text) = part["text"].as_str() {
                parsed.text.push_str(text);
            } else if part["functionCall"].is_object() {
                let fc = &part["functionCall"];
                let args = if fc["args"].is_null() { json!({}) } else { fc["args"].clone() };
                let mut call = ToolCall::new(fc["name"].as_str().unwrap_or_default(), args);
                if let Some(id) = fc["id"].as_str() {
                    call = call.with_call_id(id);
                }
                parsed.tool_calls.push(call);
            }
        }

        for chunk in candidate["groundingMetadata"]["groundingChunks"].as_array().into_iter().flatten() {
            if let Some(uri) = chunk["web"]["uri"].as_str() {
                parsed.citations.push(Citation {
                    url: uri.to_string(),
                    title: chunk["web"]["title"].as_str().map(str::to_string),
                });
            }
        }

        if body["usageMetadata"].is_object() {
            let usage = &body["usageMetadata"];
            parsed.usage = Some(Usage {
                prompt_tokens: http::as_u32(&usage["promptTokenCount"]),
                completion_tokens: http::as_u32(&usage["candidatesTokenCount"]),
                total_tokens: http::as_u32(&usage["totalTokenCount"]),
            });
        }
        parsed.finish_reason = candidate["finishReason"].as_str().map(str::to_string);
        parsed.response_id = body["responseId"].as_str().map(str::to_string);
        parsed.model = body["modelVersion"].as_str().map(str::to_string);
        Ok(parsed.normalize())
    }

    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter> {
        Box::new(GoogleStream::default())
    }
}

fn body_error(error: &Value) -> ProviderError {
    let message = error["message"].as_str().unwrap_or("Gemini error").to_string();
    let status_code = error["code"]
        .as_u64()
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(500);
    match status_code {
        429 => ProviderError::RateLimited { retry_after_secs: 5 },
        401 | 403 => ProviderError::AuthenticationFailed(message),
        _ => ProviderError::ApiError {
            status_code,
            message,
        },
    }
}

/// Merges streamed `GenerateContentResponse` chunks into one body.
#[derive(Debug, Default)]
struct GoogleStream {
    parts: Vec<Value>,
    finish_reason: Option<String>,
    grounding: Option<Value>,
    usage: Option<Value>,
    response_id: Option<String>,
    model: Option<String>,
    started: bool,
}

impl StreamInterpreter for GoogleStream {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError> {
        if event.terminal {
            return Ok(StreamStep::end());
        }
        let data = &event.data;
        if data["error"].is_object() {
            return Err(body_error(&data["error"]));
        }
        self.started = true;

        if let Some(id) = data["responseId"].as_str() {
            self.response_id = Some(id.to_string());
        }
        if let Some(model) = data["modelVersion"].as_str() {
            self.model = Some(model.to_string());
        }
        if data["usageMetadata"].is_object() {
            self.usage = Some(data["usageMetadata"].clone());
        }

        let candidate = &data["candidates"][0];
        let mut delta = String::new();
        for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
            let is_text = part["text"].is_string() && part["thought"] != true;
            if is_text {
                let text = part["text"].as_str().unwrap_or_default();
                delta.push_str(text);
                match self.parts.last_mut() {
                    Some(last) if last["text"].is_string() && last["thought"] != true => {
                        append_text(&mut last["text"], text);
                    }
                    _ => self.parts.push(json!({"text": text})),
                }
            } else {
                self.parts.push(part.clone());
            }
        }
        if candidate["groundingMetadata"].is_object() {
            self.grounding = Some(candidate["groundingMetadata"].clone());
        }

        let mut step = StreamStep::default();
        if !delta.is_empty() {
            step.delta = Some(delta);
        }
        if let Some(reason) = candidate["finishReason"].as_str() {
            self.finish_reason = Some(reason.to_string());
            step.finish_reason = Some(reason.to_string());
        }
        Ok(step)
    }

    fn snapshot(&self) -> Value {
        if !self.started {
            return json!({});
        }
        let mut candidate = json!({
            "content": {"role": "model", "parts": self.parts},
            "finishReason": self.finish_reason,
        });
        if let Some(grounding) = &self.grounding {
            candidate["groundingMetadata"] = grounding.clone();
        }
        let mut body = json!({
            "candidates": [candidate],
            "responseId": self.response_id,
            "modelVersion": self.model,
        });
        if let Some(usage) = &self.usage {
            body["usageMetadata"] = usage.clone();
        }
        body
    }
}
