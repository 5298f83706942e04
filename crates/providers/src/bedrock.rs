//! AWS Bedrock Converse adapter.
//!
//! Uses the model-agnostic Converse API with Bedrock API-key (Bearer)
//! authentication. Media must be inline bytes; Converse has no URL
//! sources. Structured output goes through the forced `json_response` tool.
//! Streaming uses the binary AWS event-stream framing.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use switchyard_core::{
    Content, ContentPart, EventStream, MediaSource, Message, ParsedCompletion, PreparedRequest,
    ProviderAdapter, ProviderError, ProviderKind, Role, StreamEvent, StreamInterpreter,
    StreamStep, ToolCall, Usage,
};
use tracing::debug;

use crate::eventstream::EventStreamDecoder;
use crate::http::{self, ProviderSettings};
use crate::stream::{append_text, decode_response, slot};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_MODEL: &str = "anthropic.claude-3-5-sonnet-20241022-v2:0";

pub struct BedrockAdapter {
    settings: ProviderSettings,
    base_url: String,
    client: reqwest::Client,
}

impl BedrockAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        let region = settings.region.as_deref().unwrap_or(DEFAULT_REGION);
        let default_url = format!("https://bedrock-runtime.{region}.amazonaws.com");
        Self {
            base_url: settings.base_url_or(&default_url),
            client: settings.client(),
            settings,
        }
    }

    fn post(&self, model: &str, action: &str, payload: &Value) -> Result<reqwest::RequestBuilder, ProviderError> {
        let api_key = self.settings.require_key(self.kind())?;
        Ok(self
            .client
            .post(format!("{}/model/{}/{action}", self.base_url, encode_model_id(model)))
            .bearer_auth(api_key)
            .json(payload))
    }

    fn content_block(&self, part: &ContentPart) -> Result<Value, ProviderError> {
        let block = match part {
            ContentPart::Text { text } => json!({"text": text}),
            ContentPart::Image { source } => {
                let (media_type, data) = self.inline_bytes(source)?;
                json!({"image": {"format": image_format(media_type), "source": {"bytes": data}}})
            }
            ContentPart::File { source, filename } => {
                let (media_type, data) = self.inline_bytes(source)?;
                json!({"document": {
                    "format": document_format(media_type),
                    "name": document_name(filename.as_deref()),
                    "source": {"bytes": data},
                }})
            }
            ContentPart::ToolCall(call) => json!({"toolUse": {
                "toolUseId": call.wire_id(),
                "name": call.name,
                "input": http::arguments_object(&call.arguments),
            }}),
            ContentPart::ToolCallResult(result) => {
                let content = match &result.result {
                    Value::Object(_) | Value::Array(_) => json!([{"json": result.result}]),
                    _ => json!([{"text": result.result_text()}]),
                };
                json!({"toolResult": {"toolUseId": result.wire_id(), "content": content}})
            }
        };
        Ok(block)
    }

    fn inline_bytes<'a>(&self, source: &'a MediaSource) -> Result<(&'a str, &'a str), ProviderError> {
        match source {
            MediaSource::Base64 { media_type, data } => Ok((media_type.as_str(), data.as_str())),
            MediaSource::Url { .. } => Err(http::unsupported(self.kind(), "media referenced by URL")),
        }
    }
}

/// Model ids contain `:` (and ARNs contain `/`), which must be escaped in
/// the path.
fn encode_model_id(model: &str) -> String {
    model.replace(':', "%3A").replace('/', "%2F")
}

fn image_format(media_type: &str) -> &str {
    match media_type.rsplit('/').next() {
        Some("jpg") => "jpeg",
        Some(subtype) => subtype,
        None => "png",
    }
}

fn document_format(media_type: &str) -> &str {
    match media_type {
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/csv" => "csv",
        "text/html" => "html",
        "application/msword" => "doc",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        _ => "pdf",
    }
}

/// Converse only accepts alphanumerics, whitespace, hyphens, parentheses
/// and square brackets in document names.
fn document_name(filename: Option<&str>) -> String {
    let stem = filename
        .map(|f| f.rsplit_once('.').map_or(f, |(stem, _)| stem))
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    stem.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || "-()[]".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for BedrockAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bedrock
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
        let mut api_messages = Vec::with_capacity(messages.len());
        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => continue,
            };
            let content = match &msg.content {
                Content::Text(text) => vec![json!({"text": text})],
                Content::Parts(parts) => parts
                    .iter()
                    .map(|p| self.content_block(p))
                    .collect::<Result<Vec<_>, _>>()?,
            };
            api_messages.push(json!({"role": role, "content": content}));
        }
        Ok(json!(api_messages))
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        self.check_provider_tools(&request.tools)?;
        let mut body = json!({
            "messages": self.format_messages(&request.messages)?,
            "inferenceConfig": {
                "maxTokens": request.max_tokens,
                "temperature": request.temperature,
            },
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
            body["system"] = json!(system);
        }

        let tools: Vec<Value> = request
            .function_tools()
            .into_iter()
            .map(|t| {
                json!({"toolSpec": {
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": {"json": t.arguments_schema},
                }})
            })
            .collect();
        if !tools.is_empty() {
            let mut tool_config = json!({"tools": tools});
            if let Some(name) = request.forced_tool() {
                tool_config["toolChoice"] = json!({"tool": {"name": name}});
            }
            body["toolConfig"] = tool_config;
        }
        Ok(body)
    }

    async fn send(&self, request: &PreparedRequest, payload: &Value) -> Result<Value, ProviderError> {
        debug!(provider = "bedrock", model = %request.model, "Sending completion request");
        let builder = self.post(&request.model, "converse", payload)?;
        http::send_json(builder, self.kind()).await
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        debug!(provider = "bedrock", model = %request.model, "Sending streaming request");
        let builder = self.post(&request.model, "converse-stream", payload)?;
        let response = http::send_streaming(builder, self.kind()).await?;
        Ok(decode_response(response, EventStreamDecoder::default()))
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion, ProviderError> {
        let blocks = body["output"]["message"]["content"].as_array().ok_or_else(|| {
            ProviderError::InvalidResponse("Converse response has no output message".into())
        })?;

        let mut parsed = ParsedCompletion::default();
        for block in blocks {
            if let Some(text) = block["text"].as_str() {
                parsed.text.push_str(text);
            } else if block["toolUse"].is_object() {
                let tool_use = &block["toolUse"];
                let mut call = ToolCall::new(
                    tool_use["name"].as_str().unwrap_or_default(),
                    tool_use["input"].clone(),
                );
                if let Some(id) = tool_use["toolUseId"].as_str() {
                    call = call.with_call_id(id);
                }
                parsed.tool_calls.push(call);
            }
        }

        if body["usage"].is_object() {
            let usage = &body["usage"];
            parsed.usage = Some(Usage {
                prompt_tokens: http::as_u32(&usage["inputTokens"]),
                completion_tokens: http::as_u32(&usage["outputTokens"]),
                total_tokens: http::as_u32(&usage["totalTokens"]),
            });
        }
        parsed.finish_reason = body["stopReason"].as_str().map(str::to_string);
        Ok(parsed.normalize())
    }

    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter> {
        Box::new(BedrockStream::default())
    }
}

/// Rebuilds a Converse response body from `converse-stream` events.
struct BedrockStream {
    body: Value,
    tool_input: HashMap<u64, String>,
}

impl Default for BedrockStream {
    fn default() -> Self {
        Self {
            body: json!({"output": {"message": {"role": "assistant", "content": []}}}),
            tool_input: HashMap::new(),
        }
    }
}

impl BedrockStream {
    fn block(&mut self, index: u64) -> Result<&mut Value, ProviderError> {
        slot(&mut self.body["output"]["message"]["content"], index)
    }
}

impl StreamInterpreter for BedrockStream {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError> {
        if event.terminal {
            return Ok(StreamStep::end());
        }
        let data = &event.data;
        let index = data["contentBlockIndex"].as_u64().unwrap_or(0);

        match event.event_type().unwrap_or_default() {
            "contentBlockStart" => {
                let tool_use = &data["start"]["toolUse"];
                if tool_use.is_object() {
                    *self.block(index)? = json!({"toolUse": {
                        "toolUseId": tool_use["toolUseId"],
                        "name": tool_use["name"],
                        "input": {},
                    }});
                }
            }
            "contentBlockDelta" => {
                let delta = &data["delta"];
                if let Some(text) = delta["text"].as_str() {
                    append_text(&mut self.block(index)?["text"], text);
                    return Ok(StreamStep::delta(text));
                }
                if let Some(fragment) = delta["toolUse"]["input"].as_str() {
                    self.tool_input.entry(index).or_default().push_str(fragment);
                }
            }
            "contentBlockStop" => {
                if let Some(raw) = self.tool_input.remove(&index) {
                    self.block(index)?["toolUse"]["input"] = http::parse_arguments(&raw);
                }
            }
            "messageStop" => {
                let reason = data["stopReason"].as_str().unwrap_or("end_turn").to_string();
                self.body["stopReason"] = json!(reason);
                return Ok(StreamStep::finished(reason));
            }
            "metadata" => {
                if data["usage"].is_object() {
                    self.body["usage"] = data["usage"].clone();
                }
            }
            _ => {}
        }
        Ok(StreamStep::default())
    }

    fn snapshot(&self) -> Value {
        self.body.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventstream::encode_frame;
    use crate::testing::{drain, prepared};
    use switchyard_core::{ProviderToolKind, ResponseFormat, ToolCallResult, ToolDefinition};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: Option<&str>) -> BedrockAdapter {
        let mut settings = ProviderSettings::new("bedrock-key").with_region("eu-west-1");
        if let Some(url) = base_url {
            settings = settings.with_base_url(url);
        }
        BedrockAdapter::new(settings)
    }

    #[test]
    fn regional_endpoint_and_model_encoding() {
        let adapter = adapter(None);
        assert_eq!(adapter.base_url, "https://bedrock-runtime.eu-west-1.amazonaws.com");
        assert_eq!(
            encode_model_id("anthropic.claude-3-5-sonnet-20241022-v2:0"),
            "anthropic.claude-3-5-sonnet-20241022-v2%3A0"
        );
    }

    #[test]
    fn converse_request_shape() {
        let mut req = prepared(vec![Message::user("Capital of France?")]);
        req.system_prompt = Some("Be brief.".into());
        req.response_format = ResponseFormat::Json;
        req.response_schema = Some(json!({"type": "object"}));

        let body = adapter(None).build_request_parameters(&req).unwrap();
        assert!(body.get("model").is_none());
        assert_eq!(body["system"], json!([{"text": "Be brief."}]));
        assert_eq!(body["inferenceConfig"]["maxTokens"], 100);
        assert_eq!(body["toolConfig"]["tools"][0]["toolSpec"]["name"], "json_response");
        assert_eq!(body["toolConfig"]["toolChoice"], json!({"tool": {"name": "json_response"}}));
        assert_eq!(body["messages"][0]["content"], json!([{"text": "Capital of France?"}]));
    }

    #[test]
    fn tool_blocks() {
        let call = ToolCall::new("get_capital", json!({"country": "France"})).with_call_id("tu_1");
        let messages = vec![
            Message::assistant_tool_call(call.clone()),
            Message::tool_result(ToolCallResult::for_call(&call, json!({"capital": "Paris"}))),
        ];
        let formatted = adapter(None).format_messages(&messages).unwrap();
        assert_eq!(formatted[0]["content"][0]["toolUse"]["toolUseId"], "tu_1");
        assert_eq!(
            formatted[1]["content"][0]["toolResult"],
            json!({"toolUseId": "tu_1", "content": [{"json": {"capital": "Paris"}}]})
        );
    }

    #[test]
    fn media_must_be_inline() {
        let inline = Message::with_parts(
            Role::User,
            vec![
                ContentPart::Image { source: MediaSource::base64("image/jpg", "abc") },
                ContentPart::File {
                    source: MediaSource::base64("application/pdf", "JVBER"),
                    filename: Some("q3 report.v2.pdf".into()),
                },
            ],
        );
        let formatted = adapter(None).format_messages(&[inline]).unwrap();
        assert_eq!(formatted[0]["content"][0]["image"]["format"], "jpeg");
        assert_eq!(formatted[0]["content"][1]["document"]["name"], "q3 report-v2");

        let by_url = Message::with_parts(
            Role::User,
            vec![ContentPart::Image { source: MediaSource::url("https://x/cat.png") }],
        );
        assert!(matches!(
            adapter(None).format_messages(&[by_url]),
            Err(ProviderError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn no_hosted_tools() {
        let tools = vec![ToolDefinition::provider_managed(ProviderToolKind::WebSearch)];
        assert!(adapter(None).check_provider_tools(&tools).is_err());

        let mut req = prepared(vec![Message::user("Search the news")]);
        req.tools = tools;
        assert!(matches!(
            adapter(None).build_request_parameters(&req),
            Err(ProviderError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn out_of_range_block_index_is_a_protocol_error() {
        let mut interp = adapter(None).stream_interpreter();
        let text = |index: Value| {
            StreamEvent::new(
                Some("contentBlockDelta".into()),
                json!({"contentBlockIndex": index, "delta": {"text": "Hi"}}),
            )
        };
        assert!(interp.interpret(&text(json!(0))).is_ok());
        assert!(matches!(
            interp.interpret(&text(json!(u64::MAX))),
            Err(ProviderError::StreamProtocol(_))
        ));
        assert!(matches!(interp.interpret(&text(json!(7))), Err(ProviderError::StreamProtocol(_))));
        assert_eq!(interp.snapshot()["output"]["message"]["content"], json!([{"text": "Hi"}]));
    }

    #[test]
    fn parse_converse_output() {
        let body = json!({
            "output": {"message": {"role": "assistant", "content": [
                {"text": "Looking it up."},
                {"toolUse": {"toolUseId": "tu_2", "name": "get_capital", "input": {"country": "France"}}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 30, "outputTokens": 12, "totalTokens": 42}
        });
        let parsed = adapter(None).parse_response(&body).unwrap();
        assert_eq!(parsed.tool_calls[0].provider_call_id.as_deref(), Some("tu_2"));
        assert_eq!(parsed.tool_calls[0].assistant_message.as_deref(), Some("Looking it up."));
        assert_eq!(parsed.usage.unwrap().total_tokens, 42);
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn assistant_text_round_trips() {
        let adapter = adapter(None);
        let text = "Plain answer.\n";
        let body = json!({"output": {"message": {"content": [{"text": text}]}}});
        let parsed = adapter.parse_response(&body).unwrap();
        let formatted = adapter.format_messages(&[Message::assistant(parsed.text)]).unwrap();
        assert_eq!(formatted[0]["content"][0]["text"], text);
    }

    fn event(event_type: &str, payload: Value) -> Vec<u8> {
        encode_frame(
            &[
                (":event-type", event_type),
                (":content-type", "application/json"),
                (":message-type", "event"),
            ],
            payload.to_string().as_bytes(),
        )
    }

    #[tokio::test]
    async fn streams_event_frames() {
        let mut body = Vec::new();
        body.extend(event("messageStart", json!({"role": "assistant"})));
        body.extend(event("contentBlockDelta", json!({"contentBlockIndex": 0, "delta": {"text": "Paris"}})));
        body.extend(event("contentBlockStop", json!({"contentBlockIndex": 0})));
        body.extend(event("contentBlockStart", json!({"contentBlockIndex": 1, "start": {"toolUse": {"toolUseId": "tu_s", "name": "verify"}}})));
        body.extend(event("contentBlockDelta", json!({"contentBlockIndex": 1, "delta": {"toolUse": {"input": "{\"city\":"}}})));
        body.extend(event("contentBlockDelta", json!({"contentBlockIndex": 1, "delta": {"toolUse": {"input": "\"Paris\"}"}}})));
        body.extend(event("contentBlockStop", json!({"contentBlockIndex": 1})));
        body.extend(event("messageStop", json!({"stopReason": "tool_use"})));
        body.extend(event("metadata", json!({"usage": {"inputTokens": 9, "outputTokens": 3, "totalTokens": 12}})));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/test-model/converse-stream"))
            .and(header("authorization", "Bearer bedrock-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "application/vnd.amazon.eventstream"),
            )
            .mount(&server)
            .await;

        let adapter = adapter(Some(&server.uri()));
        let mut req = prepared(vec![Message::user("Capital?")]);
        req.stream = true;
        let payload = adapter.build_request_parameters(&req).unwrap();
        let stream = adapter.send_streaming(&req, &payload).await.unwrap();
        let (deltas, parsed) = drain(&adapter, stream).await.unwrap();

        assert_eq!(deltas, vec!["Paris"]);
        assert_eq!(parsed.text, "Paris");
        assert_eq!(parsed.tool_calls[0].arguments, json!({"city": "Paris"}));
        assert_eq!(parsed.usage.unwrap().total_tokens, 12);
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_use"));
    }
}
