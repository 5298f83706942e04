//! End-to-end integration tests for Switchyard.
//!
//! These wire the real config, adapters, gateway, JSONL store and agent
//! loop together the way the binary does, with vendor APIs served by
//! wiremock.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use switchyard_agent::{AgentLoop, AgentStatus};
use switchyard_config::{AppConfig, ProviderConfig};
use switchyard_core::{
    CompletionRequest, CompletionResult, FailureKind, Message, ProviderKind, StateSink, StreamEvent, ToolContext,
    ToolDefinition, ToolError, ToolExecutor,
};
use switchyard_gateway::ChatGateway;
use switchyard_store::JsonlStateSink;
use switchyard_tools::ToolRegistry;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Setup ────────────────────────────────────────────────────────────────

fn config(kind: ProviderKind, server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.default_provider = kind;
    config.retry.base_delay_secs = 0;
    config.retry.max_delay_secs = 0;
    config.providers.insert(
        kind.as_str().to_string(),
        ProviderConfig {
            api_key: Some("sk-test".into()),
            api_url: Some(server.uri()),
            ..ProviderConfig::default()
        },
    );
    config
}

fn gateway(config: &AppConfig, store: &std::path::Path) -> ChatGateway {
    ChatGateway::from_config(config, Arc::new(JsonlStateSink::open(store)))
}

fn openai_text(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o",
        "choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}
    })
}

fn openai_tool_call(id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "id": "chatcmpl-2",
        "model": "gpt-4o",
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 50, "completion_tokens": 10, "total_tokens": 60}
    })
}

// ── Chat ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_chat_is_priced_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text("Paris")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("completions.jsonl");
    let config = config(ProviderKind::OpenaiCompletions, &server);
    let gateway = gateway(&config, &store);

    let result = gateway
        .chat(CompletionRequest::with_message(Message::user("Capital of France?")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.parsed_response(), "Paris");
    assert_eq!(result.model, "gpt-4o");
    assert_eq!(result.total_tokens, 1500);
    assert!((result.cost.unwrap() - 0.0075).abs() < 1e-9);

    // A fresh sink reads the record back from disk.
    let reopened = JsonlStateSink::open(&store);
    let record = reopened.get(&result.id).await.unwrap().unwrap();
    assert_eq!(record.raw_response, "Paris");
    assert!(record.completed_at.is_some());
    assert!(record.failure.is_none());
}

#[tokio::test]
async fn e2e_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text("Paris")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(ProviderKind::OpenaiCompletions, &server);
    let gateway = gateway(&config, &dir.path().join("completions.jsonl"));

    let result = gateway
        .chat(CompletionRequest::with_message(Message::user("Capital of France?")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.retry_count, 1);
    assert_eq!(result.parsed_response(), "Paris");
}

#[tokio::test]
async fn e2e_auth_failure_is_recorded_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("completions.jsonl");
    let config = config(ProviderKind::OpenaiCompletions, &server);
    let gateway = gateway(&config, &store);

    let err = gateway
        .chat(CompletionRequest::with_message(Message::user("hi")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Authentication);

    let records = std::fs::read_to_string(&store).unwrap();
    let record: CompletionResult = serde_json::from_str(records.lines().next().unwrap()).unwrap();
    assert_eq!(record.failure.unwrap().kind, FailureKind::Authentication);
    assert!(record.failed_at.is_some());
}

#[tokio::test]
async fn e2e_anthropic_stream_delivers_deltas() {
    let sse = [
        json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 12, "output_tokens": 0}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "The capital of France "}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "is Paris."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 7}}),
        json!({"type": "message_stop"}),
    ]
    .iter()
    .map(|event| format!("event: {}\ndata: {event}\n\n", event["type"].as_str().unwrap()))
    .collect::<String>();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(ProviderKind::Anthropic, &server);
    let gateway = gateway(&config, &dir.path().join("completions.jsonl"));

    let mut deltas = Vec::new();
    let mut on_delta = |_: &CompletionResult, delta: &str, _: &StreamEvent| deltas.push(delta.to_string());
    let result = gateway
        .chat_streaming(
            CompletionRequest::with_message(Message::user("Capital of France?")).stream(true),
            &mut on_delta,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(deltas.concat(), "The capital of France is Paris.");
    assert_eq!(result.raw_response, "The capital of France is Paris.");
    assert_eq!(result.prompt_tokens, 12);
    assert_eq!(result.completion_tokens, 7);
    assert_eq!(result.finish_reason.as_deref(), Some("end_turn"));
}

// ── Agent ────────────────────────────────────────────────────────────────

struct Atlas;

#[async_trait]
impl ToolExecutor for Atlas {
    async fn execute(&self, _name: &str, arguments: &Value, _context: &ToolContext) -> Result<Value, ToolError> {
        Ok(json!({"capital": if arguments["country"] == "France" { "Paris" } else { "unknown" }}))
    }
}

#[tokio::test]
async fn e2e_agent_answers_over_openai_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_tool_call("call_1", "get_capital", json!({"country": "France"}))),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call(
            "call_2",
            "agent_final_answer",
            json!({"final_answer": "Paris"}),
        )))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("completions.jsonl");
    let config = config(ProviderKind::OpenaiCompletions, &server);
    let gateway = Arc::new(gateway(&config, &store));

    let mut tools = ToolRegistry::new().with_executor(Arc::new(Atlas));
    tools.declare(ToolDefinition::new(
        "get_capital",
        "Look up a country's capital",
        json!({"type": "object", "properties": {"country": {"type": "string"}}, "required": ["country"]}),
    ));
    let state = AgentLoop::new(gateway, tools)
        .with_config(&config.agent)
        .run("What is the capital of France?")
        .await
        .unwrap();

    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.final_answer.as_deref(), Some("Paris"));
    assert_eq!(state.iteration_count, 2);

    // The second request replays the call and answers it with a tool message.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    let call = messages.iter().find(|m| m["tool_calls"].is_array()).unwrap();
    assert_eq!(call["tool_calls"][0]["id"], "call_1");
    let tool = messages.iter().find(|m| m["role"] == "tool").unwrap();
    assert_eq!(tool["tool_call_id"], "call_1");
    assert_eq!(tool["content"], r#"{"capital":"Paris"}"#);
    let names: Vec<_> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["function"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["get_capital", "agent_final_answer"]);

    // Both gateway calls were recorded.
    let lines = std::fs::read_to_string(&store).unwrap();
    assert_eq!(lines.lines().count(), 2);
}
