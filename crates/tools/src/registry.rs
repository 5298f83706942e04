//! Tool registry and invoker.
//!
//! Holds the developer-managed tool declarations for a run, validates call
//! arguments against each tool's JSON Schema, and executes the call either
//! through an in-process [`Tool`] or the injected [`ToolExecutor`].

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{Tool, ToolCall, ToolCallResult, ToolContext, ToolDefinition, ToolError, ToolExecutor};
use tracing::debug;

use crate::final_answer::FINAL_ANSWER_TOOL;

/// What the caller should do with a tool's result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The reserved final-answer tool ran; the run is over.
    FinalAnswer(String),
    /// Echo the result back to the model.
    Observation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub result: ToolCallResult,
    pub outcome: ToolOutcome,
}

impl ToolInvocation {
    pub fn is_final(&self) -> bool {
        matches!(self.outcome, ToolOutcome::FinalAnswer(_))
    }
}

/// Registered tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    local: HashMap<String, Arc<dyn Tool>>,
    executor: Option<Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor used for declared tools without an in-process implementation.
    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Register an in-process tool. Replaces any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.declare(tool.to_definition());
        self.local.insert(tool.name().to_string(), tool);
    }

    /// Declare a tool carried out by the executor. Replaces any tool with
    /// the same name, keeping its position.
    pub fn declare(&mut self, definition: ToolDefinition) {
        self.local.remove(&definition.name);
        match self.definitions.iter_mut().find(|d| d.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    /// Check that `name` is a locally executable tool and that `arguments`
    /// match its schema.
    pub fn validate(&self, name: &str, arguments: &Value) -> Result<&ToolDefinition, ToolError> {
        let definition = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        if definition.is_provider_managed() {
            return Err(ToolError::ProviderManaged(name.to_string()));
        }
        validate_arguments(&definition.arguments_schema, arguments).map_err(|reason| {
            ToolError::InvalidArguments {
                tool_name: name.to_string(),
                schema: definition.arguments_schema.clone(),
                reason,
            }
        })?;
        Ok(definition)
    }

    /// Validate and execute `call`.
    pub async fn invoke(&self, call: &ToolCall, context: &ToolContext) -> Result<ToolInvocation, ToolError> {
        self.validate(&call.name, &call.arguments)?;
        debug!(tool = %call.name, "Invoking tool");

        let value = match self.local.get(&call.name) {
            Some(tool) => tool.execute(&call.arguments, context).await?,
            None => {
                let executor = self.executor.as_ref().ok_or_else(|| ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: "no tool executor configured".into(),
                })?;
                executor.execute(&call.name, &call.arguments, context).await?
            }
        };

        let outcome = if call.name == FINAL_ANSWER_TOOL {
            let answer = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            ToolOutcome::FinalAnswer(answer)
        } else {
            ToolOutcome::Observation
        };
        Ok(ToolInvocation {
            result: ToolCallResult::for_call(call, value),
            outcome,
        })
    }
}

/// Validate `arguments` against a JSON Schema, collecting every violation.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let validator =
        jsonschema::Validator::new(schema).map_err(|e| format!("invalid tool schema: {e}"))?;
    if validator.is_valid(arguments) {
        return Ok(());
    }
    let errors: Vec<String> = validator.iter_errors(arguments).map(|e| e.to_string()).collect();
    Err(errors.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::final_answer::FinalAnswerTool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use switchyard_core::ProviderToolKind;

    fn capital_tool() -> ToolDefinition {
        ToolDefinition::new(
            "get_capital",
            "Look up a country's capital",
            json!({
                "type": "object",
                "properties": {"country": {"type": "string"}},
                "required": ["country"]
            }),
        )
    }

    /// Records calls and answers from a fixed table.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, Value, Option<String>)>>,
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, name: &str, arguments: &Value, context: &ToolContext) -> Result<Value, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone(), context.source.clone()));
            match arguments["country"].as_str() {
                Some("France") => Ok(json!({"capital": "Paris"})),
                _ => Err(ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason: "unknown country".into(),
                }),
            }
        }
    }

    fn registry(executor: Arc<RecordingExecutor>) -> ToolRegistry {
        let mut registry = ToolRegistry::new().with_executor(executor);
        registry.declare(capital_tool());
        registry.register(Arc::new(FinalAnswerTool));
        registry
    }

    #[tokio::test]
    async fn invokes_through_executor() {
        let executor = Arc::new(RecordingExecutor::default());
        let registry = registry(executor.clone());
        let call = ToolCall::new("get_capital", json!({"country": "France"})).with_call_id("c1");

        let invocation = registry
            .invoke(&call, &ToolContext::from_source("run-1"))
            .await
            .unwrap();
        assert_eq!(invocation.outcome, ToolOutcome::Observation);
        assert_eq!(invocation.result.provider_call_id.as_deref(), Some("c1"));
        assert_eq!(invocation.result.result, json!({"capital": "Paris"}));

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[0].0, "get_capital");
        assert_eq!(calls[0].2.as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn final_answer_is_tagged() {
        let registry = registry(Arc::new(RecordingExecutor::default()));
        let call = ToolCall::new(FINAL_ANSWER_TOOL, json!({"final_answer": "Paris"}));
        let invocation = registry.invoke(&call, &ToolContext::default()).await.unwrap();
        assert!(invocation.is_final());
        assert_eq!(invocation.outcome, ToolOutcome::FinalAnswer("Paris".into()));
    }

    #[tokio::test]
    async fn unknown_tool_not_found() {
        let registry = registry(Arc::new(RecordingExecutor::default()));
        let call = ToolCall::new("X", json!({}));
        let err = registry.invoke(&call, &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "X"));
    }

    #[tokio::test]
    async fn invalid_arguments_carry_the_schema() {
        let executor = Arc::new(RecordingExecutor::default());
        let registry = registry(executor.clone());
        let call = ToolCall::new("get_capital", json!({"country": 42}));

        match registry.invoke(&call, &ToolContext::default()).await {
            Err(ToolError::InvalidArguments { tool_name, schema, reason }) => {
                assert_eq!(tool_name, "get_capital");
                assert_eq!(schema, capital_tool().arguments_schema);
                assert!(!reason.is_empty());
            }
            other => panic!("Expected InvalidArguments, got: {other:?}"),
        }
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_argument_string_is_invalid() {
        let registry = registry(Arc::new(RecordingExecutor::default()));
        let call = ToolCall::new("get_capital", json!("{\"country\": "));
        let err = registry.invoke(&call, &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn executor_errors_propagate() {
        let registry = registry(Arc::new(RecordingExecutor::default()));
        let call = ToolCall::new("get_capital", json!({"country": "Atlantis"}));
        let err = registry.invoke(&call, &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_executor_fails_execution() {
        let mut registry = ToolRegistry::new();
        registry.declare(capital_tool());
        let call = ToolCall::new("get_capital", json!({"country": "France"}));
        let err = registry.invoke(&call, &ToolContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("no tool executor"));
    }

    #[test]
    fn provider_managed_tools_are_not_invocable() {
        let mut registry = ToolRegistry::new();
        registry.declare(ToolDefinition::provider_managed(ProviderToolKind::WebSearch));
        let err = registry.validate("web_search", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::ProviderManaged(_)));
    }

    #[test]
    fn redeclaring_keeps_order() {
        let mut registry = registry(Arc::new(RecordingExecutor::default()));
        registry.declare(ToolDefinition::new("get_capital", "v2", json!({"type": "object"})));
        assert_eq!(registry.names(), vec!["get_capital", FINAL_ANSWER_TOOL]);
        assert_eq!(registry.get("get_capital").unwrap().description, "v2");
    }
}
