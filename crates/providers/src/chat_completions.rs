//! The Chat Completions wire format, shared by OpenAI and OpenRouter.
//!
//! Tool results travel as separate `tool` role messages, tool-call
//! arguments as JSON strings, and structured output through
//! `response_format` rather than a forced tool.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use switchyard_core::{
    Citation, Content, ContentPart, MediaSource, Message, ParsedCompletion, PreparedRequest,
    ProviderError, ProviderKind, ResponseFormat, Role, StreamEvent, StreamInterpreter, StreamStep,
    ToolCall, Usage,
};
use switchyard_core::request::JSON_RESPONSE_TOOL;

use crate::http;

/// Translate generic messages into Chat Completions messages.
pub(crate) fn format_messages(
    provider: ProviderKind,
    messages: &[Message],
) -> Result<Value, ProviderError> {
    let mut api_messages = Vec::with_capacity(messages.len());

    for msg in messages {
        match (&msg.role, &msg.content) {
            (Role::System, _) => {
                api_messages.push(json!({"role": "system", "content": msg.text()}));
            }
            (Role::User, Content::Text(text)) => {
                api_messages.push(json!({"role": "user", "content": text}));
            }
            (Role::Assistant, Content::Text(text)) => {
                api_messages.push(json!({"role": "assistant", "content": text}));
            }
            (Role::User, Content::Parts(parts)) => {
                let mut content = Vec::new();
                for part in parts {
                    match part {
                        ContentPart::ToolCallResult(result) => api_messages.push(json!({
                            "role": "tool",
                            "tool_call_id": result.wire_id(),
                            "content": result.result_text(),
                        })),
                        ContentPart::Text { text } => {
                            content.push(json!({"type": "text", "text": text}));
                        }
                        ContentPart::Image { source } => content.push(json!({
                            "type": "image_url",
                            "image_url": {"url": source.to_url()},
                        })),
                        ContentPart::File { source, filename } => {
                            let MediaSource::Base64 { .. } = source else {
                                return Err(http::unsupported(provider, "files referenced by URL"));
                            };
                            content.push(json!({
                                "type": "file",
                                "file": {
                                    "file_data": source.to_url(),
                                    "filename": filename.clone().unwrap_or_else(|| "file".into()),
                                },
                            }));
                        }
                        ContentPart::ToolCall(_) => {
                            return Err(http::unsupported(provider, "tool calls in user messages"));
                        }
                    }
                }
                if !content.is_empty() {
                    api_messages.push(json!({"role": "user", "content": content}));
                }
            }
            (Role::Assistant, Content::Parts(parts)) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for part in parts {
                    match part {
                        ContentPart::Text { text: t } => text.push_str(t),
                        ContentPart::ToolCall(call) => tool_calls.push(json!({
                            "id": call.wire_id(),
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": arguments_string(&call.arguments),
                            },
                        })),
                        _ => {
                            return Err(http::unsupported(
                                provider,
                                "media or tool results in assistant messages",
                            ));
                        }
                    }
                }
                let content = if text.is_empty() { Value::Null } else { json!(text) };
                let mut message = json!({"role": "assistant", "content": content});
                if !tool_calls.is_empty() {
                    message["tool_calls"] = json!(tool_calls);
                }
                api_messages.push(message);
            }
        }
    }
    Ok(json!(api_messages))
}

/// Arguments are sent as a JSON string. Unparseable arguments kept as a
/// string are replayed verbatim.
fn arguments_string(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// The request body common to every Chat Completions vendor.
pub(crate) fn base_parameters(
    provider: ProviderKind,
    request: &PreparedRequest,
    max_tokens_field: &str,
) -> Result<Value, ProviderError> {
    let mut messages = Vec::new();
    if let Some(system) = request.system_prompt_with_format_hint() {
        messages.push(json!({"role": "system", "content": system}));
    }
    if let Value::Array(formatted) = format_messages(provider, &request.messages)? {
        messages.extend(formatted);
    }

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
    });
    body[max_tokens_field] = json!(request.max_tokens);

    let tools: Vec<Value> = request
        .developer_tools()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.arguments_schema,
                },
            })
        })
        .collect();
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    if let Some(name) = &request.tool_choice {
        body["tool_choice"] = json!({"type": "function", "function": {"name": name}});
    }

    if request.response_format == ResponseFormat::Json {
        body["response_format"] = match &request.response_schema {
            Some(schema) => json!({
                "type": "json_schema",
                "json_schema": {"name": JSON_RESPONSE_TOOL, "schema": schema, "strict": false},
            }),
            None => json!({"type": "json_object"}),
        };
    }
    if request.stream {
        body["stream"] = json!(true);
    }
    Ok(body)
}

/// Extract the first choice of a Chat Completions response.
pub(crate) fn parse_response(body: &Value) -> Result<ParsedCompletion, ProviderError> {
    if body["error"].is_object() {
        return Err(body_error(&body["error"]));
    }
    let choice = &body["choices"][0];
    if !choice.is_object() {
        return Err(ProviderError::InvalidResponse("response has no choices".into()));
    }
    let message = &choice["message"];

    let mut parsed = ParsedCompletion {
        text: message["content"].as_str().unwrap_or_default().to_string(),
        ..ParsedCompletion::default()
    };

    for tc in message["tool_calls"].as_array().into_iter().flatten() {
        let function = &tc["function"];
        let arguments = match &function["arguments"] {
            Value::String(raw) => http::parse_arguments(raw),
            Value::Null => json!({}),
            other => other.clone(),
        };
        let mut call = ToolCall::new(function["name"].as_str().unwrap_or_default(), arguments);
        if let Some(id) = tc["id"].as_str() {
            call = call.with_call_id(id);
        }
        parsed.tool_calls.push(call);
    }

    for annotation in message["annotations"].as_array().into_iter().flatten() {
        let cite = &annotation["url_citation"];
        if annotation["type"] == "url_citation"
            && let Some(url) = cite["url"].as_str()
        {
            parsed.citations.push(Citation {
                url: url.to_string(),
                title: cite["title"].as_str().map(str::to_string),
            });
        }
    }

    if body["usage"].is_object() {
        let usage = &body["usage"];
        parsed.usage = Some(Usage {
            prompt_tokens: http::as_u32(&usage["prompt_tokens"]),
            completion_tokens: http::as_u32(&usage["completion_tokens"]),
            total_tokens: http::as_u32(&usage["total_tokens"]),
        });
    }
    parsed.finish_reason = choice["finish_reason"].as_str().map(str::to_string);
    parsed.response_id = body["id"].as_str().map(str::to_string);
    parsed.model = body["model"].as_str().map(str::to_string);
    Ok(parsed.normalize())
}

fn body_error(error: &Value) -> ProviderError {
    let message = error["message"].as_str().unwrap_or("provider error").to_string();
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

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates `chat.completion.chunk` events into a completion body.
#[derive(Debug, Default)]
pub(crate) struct ChatCompletionsStream {
    id: Option<String>,
    model: Option<String>,
    content: String,
    tool_calls: BTreeMap<u64, PartialToolCall>,
    annotations: Vec<Value>,
    usage: Option<Value>,
    finish_reason: Option<String>,
}

impl StreamInterpreter for ChatCompletionsStream {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError> {
        if event.terminal {
            return Ok(StreamStep::end());
        }
        let data = &event.data;
        if data["error"].is_object() {
            return Err(body_error(&data["error"]));
        }
        if let Some(id) = data["id"].as_str() {
            self.id = Some(id.to_string());
        }
        if let Some(model) = data["model"].as_str() {
            self.model = Some(model.to_string());
        }
        if data["usage"].is_object() {
            self.usage = Some(data["usage"].clone());
        }

        let mut step = StreamStep::default();
        let choice = &data["choices"][0];
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
            self.content.push_str(text);
            step.delta = Some(text.to_string());
        }

        for tc in delta["tool_calls"].as_array().into_iter().flatten() {
            let index = tc["index"].as_u64().unwrap_or(0);
            let partial = self.tool_calls.entry(index).or_default();
            if let Some(id) = tc["id"].as_str() {
                partial.id = Some(id.to_string());
            }
            if let Some(name) = tc["function"]["name"].as_str() {
                partial.name.push_str(name);
            }
            if let Some(args) = tc["function"]["arguments"].as_str() {
                partial.arguments.push_str(args);
            }
        }

        if let Some(annotations) = delta["annotations"].as_array() {
            self.annotations.extend(annotations.iter().cloned());
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            self.finish_reason = Some(reason.to_string());
            step.finish_reason = Some(reason.to_string());
        }
        Ok(step)
    }

    fn snapshot(&self) -> Value {
        let tool_calls: Vec<Value> = self
            .tool_calls
            .values()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {"name": tc.name, "arguments": tc.arguments},
                })
            })
            .collect();
        let mut body = json!({
            "id": self.id,
            "model": self.model,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": self.content,
                    "tool_calls": tool_calls,
                    "annotations": self.annotations,
                },
                "finish_reason": self.finish_reason,
            }],
        });
        if let Some(usage) = &self.usage {
            body["usage"] = usage.clone();
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::prepared;
    use switchyard_core::{ToolCallResult, ToolDefinition};

    const KIND: ProviderKind = ProviderKind::OpenaiCompletions;

    #[test]
    fn tool_results_become_tool_messages() {
        let call = ToolCall::new("get_capital", json!({"country": "France"})).with_call_id("call_1");
        let messages = vec![
            Message::user("Capital of France?"),
            Message::assistant_tool_call(call.clone()),
            Message::tool_result(ToolCallResult::for_call(&call, json!({"capital": "Paris"}))),
        ];
        let formatted = format_messages(KIND, &messages).unwrap();

        assert_eq!(formatted[1]["content"], Value::Null);
        assert_eq!(formatted[1]["tool_calls"][0]["function"]["arguments"], r#"{"country":"France"}"#);
        assert_eq!(
            formatted[2],
            json!({"role": "tool", "tool_call_id": "call_1", "content": r#"{"capital":"Paris"}"#})
        );
    }

    #[test]
    fn media_parts() {
        let msg = Message::with_parts(
            Role::User,
            vec![
                ContentPart::text("What is this?"),
                ContentPart::Image { source: MediaSource::base64("image/png", "iVBOR") },
                ContentPart::File {
                    source: MediaSource::base64("application/pdf", "JVBER"),
                    filename: None,
                },
            ],
        );
        let formatted = format_messages(KIND, &[msg]).unwrap();
        let content = &formatted[0]["content"];
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,iVBOR");
        assert_eq!(content[2]["file"]["file_data"], "data:application/pdf;base64,JVBER");
        assert_eq!(content[2]["file"]["filename"], "file");

        let by_url = Message::with_parts(
            Role::User,
            vec![ContentPart::File { source: MediaSource::url("https://x/a.pdf"), filename: None }],
        );
        assert!(matches!(
            format_messages(KIND, &[by_url]),
            Err(ProviderError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn structured_output_uses_response_format() {
        let mut req = prepared(vec![Message::user("Capital of France?")]);
        req.response_format = ResponseFormat::Json;
        req.response_schema = Some(json!({"type": "object"}));
        req.tools = vec![ToolDefinition::new("lookup", "Look up", json!({"type": "object"}))];

        let body = base_parameters(KIND, &req, "max_completion_tokens").unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "json_response");
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["max_completion_tokens"], 100);

        req.response_schema = None;
        let body = base_parameters(KIND, &req, "max_tokens").unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("JSON"));
    }

    #[test]
    fn parse_tool_calls_and_citations() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Paris.",
                    "tool_calls": [{"id": "call_a", "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"Paris\"}"}}],
                    "annotations": [{"type": "url_citation",
                        "url_citation": {"url": "https://example.com", "title": "Example"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        });
        let parsed = parse_response(&body).unwrap();
        assert_eq!(parsed.tool_calls[0].arguments, json!({"q": "Paris"}));
        assert_eq!(parsed.tool_calls[0].assistant_message.as_deref(), Some("Paris."));
        assert_eq!(parsed.citations[0].url, "https://example.com");
        assert_eq!(parsed.usage.unwrap().total_tokens, 21);
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn error_body_is_api_error() {
        let body = json!({"error": {"message": "Provider returned error", "code": 502}});
        assert!(matches!(
            parse_response(&body),
            Err(ProviderError::ApiError { status_code: 502, .. })
        ));
        assert!(matches!(
            parse_response(&json!({"choices": []})),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn stream_accumulates_tool_call_fragments() {
        let chunks = [
            json!({"id": "c1", "model": "gpt-4o", "choices": [{"delta": {"role": "assistant", "content": ""}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_x", "function": {"name": "lookup", "arguments": ""}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"q\":"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"Paris\"}"}}]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 4, "completion_tokens": 6, "total_tokens": 10}}),
        ];
        let mut interp = ChatCompletionsStream::default();
        let mut finished = false;
        for chunk in chunks {
            let step = interp.interpret(&StreamEvent::new(None, chunk)).unwrap();
            assert!(step.delta.is_none());
            finished |= step.finish_reason.is_some();
        }
        assert!(finished);
        assert!(interp.interpret(&StreamEvent::done()).unwrap().end_of_stream);

        let parsed = parse_response(&interp.snapshot()).unwrap();
        assert_eq!(parsed.tool_calls[0].provider_call_id.as_deref(), Some("call_x"));
        assert_eq!(parsed.tool_calls[0].arguments, json!({"q": "Paris"}));
        assert_eq!(parsed.usage.unwrap().total_tokens, 10);
        assert_eq!(parsed.response_id.as_deref(), Some("c1"));
    }

    #[test]
    fn assistant_text_round_trips() {
        let text = "Bonjour\n  le monde ";
        let body = json!({"choices": [{"message": {"role": "assistant", "content": text}}]});
        let parsed = parse_response(&body).unwrap();
        let formatted = format_messages(KIND, &[Message::assistant(parsed.text)]).unwrap();
        assert_eq!(formatted[0]["content"], text);
    }
}
