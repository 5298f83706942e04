//! Scripted adapter shared by the gateway unit tests.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use switchyard_core::{
    EventStream, Message, ParsedCompletion, PreparedRequest, ProviderAdapter, ProviderError,
    ProviderKind, ProviderToolKind, StreamEvent, StreamInterpreter, StreamStep, ToolCall, Usage,
};

/// Replays queued bodies and streams. Bodies look like
/// `{"text", "tool_calls": [{name, arguments}], "usage", "finish_reason"}`.
pub struct ScriptedAdapter {
    responses: Mutex<VecDeque<Result<Value, ProviderError>>>,
    streams: Mutex<VecDeque<Vec<Result<StreamEvent, ProviderError>>>>,
    requests: Mutex<Vec<PreparedRequest>>,
    calls: AtomicUsize,
    supported: Vec<ProviderToolKind>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            supported: Vec::new(),
        }
    }

    pub fn respond(self, response: Result<Value, ProviderError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn stream(self, events: Vec<Result<StreamEvent, ProviderError>>) -> Self {
        self.streams.lock().unwrap().push_back(events);
        self
    }

    pub fn with_provider_tools(mut self, tools: Vec<ProviderToolKind>) -> Self {
        self.supported = tools;
        self
    }

    /// Network attempts made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &PreparedRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
    }
}

pub fn text_body(text: &str) -> Value {
    json!({
        "text": text,
        "usage": {"prompt": 1000, "completion": 500},
        "finish_reason": "stop",
    })
}

pub fn delta(text: &str) -> StreamEvent {
    StreamEvent::new(None, json!({"delta": text}))
}

pub fn finish(reason: &str) -> StreamEvent {
    StreamEvent::new(None, json!({"finish": reason}))
}

pub fn tool_call_event(name: &str, arguments: Value) -> StreamEvent {
    StreamEvent::new(None, json!({"tool_call": {"name": name, "arguments": arguments}}))
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn default_temperature(&self) -> f32 {
        0.3
    }

    fn default_max_tokens(&self) -> u32 {
        256
    }

    fn supported_provider_tools(&self) -> &[ProviderToolKind] {
        &self.supported
    }

    fn format_messages(&self, messages: &[Message]) -> Result<Value, ProviderError> {
        serde_json::to_value(messages).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn build_request_parameters(&self, request: &PreparedRequest) -> Result<Value, ProviderError> {
        Ok(json!({"model": request.model, "messages": self.format_messages(&request.messages)?}))
    }

    async fn send(&self, request: &PreparedRequest, _payload: &Value) -> Result<Value, ProviderError> {
        self.record(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        _payload: &Value,
    ) -> Result<EventStream, ProviderError> {
        self.record(request);
        let events = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Ok(futures::stream::iter(events).boxed())
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion, ProviderError> {
        let mut parsed = ParsedCompletion {
            text: body["text"].as_str().unwrap_or_default().to_string(),
            finish_reason: body["finish_reason"].as_str().map(str::to_string),
            ..ParsedCompletion::default()
        };
        for call in body["tool_calls"].as_array().into_iter().flatten() {
            parsed.tool_calls.push(ToolCall::new(
                call["name"].as_str().unwrap_or_default(),
                call["arguments"].clone(),
            ));
        }
        if body["usage"].is_object() {
            let prompt = body["usage"]["prompt"].as_u64().unwrap_or(0) as u32;
            let completion = body["usage"]["completion"].as_u64().unwrap_or(0) as u32;
            parsed.usage = Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: 0,
            });
        }
        Ok(parsed.normalize())
    }

    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter> {
        Box::new(ScriptedStream {
            body: json!({"text": "", "tool_calls": []}),
        })
    }
}

struct ScriptedStream {
    body: Value,
}

impl StreamInterpreter for ScriptedStream {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError> {
        if event.terminal {
            return Ok(StreamStep::end());
        }
        if let Some(text) = event.data["delta"].as_str() {
            let joined = format!("{}{text}", self.body["text"].as_str().unwrap_or_default());
            self.body["text"] = json!(joined);
            return Ok(StreamStep::delta(text));
        }
        if event.data["tool_call"].is_object() {
            if let Some(calls) = self.body["tool_calls"].as_array_mut() {
                calls.push(event.data["tool_call"].clone());
            }
            return Ok(StreamStep::default());
        }
        if let Some(reason) = event.data["finish"].as_str() {
            self.body["finish_reason"] = json!(reason);
            return Ok(StreamStep::finished(reason));
        }
        Ok(StreamStep::default())
    }

    fn snapshot(&self) -> Value {
        self.body.clone()
    }
}
