//! The agent loop.
//!
//! Each iteration sends the full history to the gateway, records what the
//! model did, and either runs the requested tool or appends a corrective
//! message. The loop ends on a final answer, a gateway error, or the
//! iteration cap.

use serde_json::json;
use std::sync::Arc;
use switchyard_config::AgentConfig;
use switchyard_core::{
    ChatError, CompletionRequest, Message, ProviderKind, ToolCall, ToolCallResult, ToolContext, ToolError,
};
use switchyard_gateway::ChatGateway;
use switchyard_tools::{FINAL_ANSWER_TOOL, FinalAnswerTool, ToolOutcome, ToolRegistry};
use tracing::{debug, info, warn};

use crate::history::to_messages;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::state::{AgentState, HistoryEntry, Observer};

/// Drives repeated gateway calls until the model calls the final-answer tool.
pub struct AgentLoop {
    gateway: Arc<ChatGateway>,

    /// Caller tools plus the final-answer tool
    tools: ToolRegistry,

    provider: Option<ProviderKind>,
    model: Option<String>,
    max_iterations: u32,
    system_prompt: String,
}

impl AgentLoop {
    /// Create a loop over `tools`. The final-answer tool is added unless the
    /// caller already registered a tool under that name.
    pub fn new(gateway: Arc<ChatGateway>, mut tools: ToolRegistry) -> Self {
        if !tools.contains(FINAL_ANSWER_TOOL) {
            tools.register(Arc::new(FinalAnswerTool));
        }
        Self {
            gateway,
            tools,
            provider: None,
            model: None,
            max_iterations: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Apply the `[agent]` section of the config.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.max_iterations = config.max_iterations.max(1);
        if let Some(prompt) = &config.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the iteration cap. Zero is treated as one.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Fresh state for `task` using this loop's prompt and cap.
    pub fn new_state(&self, task: impl Into<String>) -> AgentState {
        AgentState::new(task, self.system_prompt.clone(), self.max_iterations)
    }

    /// Run `task` to completion.
    pub async fn run(&self, task: impl Into<String>) -> Result<AgentState, ChatError> {
        let mut state = self.new_state(task);
        self.run_state(&mut state, None).await?;
        Ok(state)
    }

    /// Advance `state` until it finishes or hits its iteration cap.
    ///
    /// `observer` is called after every history append. Gateway errors mark
    /// the state failed and are returned; tool errors become corrective
    /// messages.
    pub async fn run_state(
        &self,
        state: &mut AgentState,
        mut observer: Option<&mut Observer<'_>>,
    ) -> Result<(), ChatError> {
        if state.is_finished() {
            return Ok(());
        }
        state.start();
        if state.history.is_empty() {
            let task = Message::user(state.task.clone());
            state.record(HistoryEntry::Message(task), &mut observer);
        }
        info!(agent = %state.id, max_iterations = state.max_iterations, "Agent run started");

        while state.iteration_count < state.max_iterations {
            state.iteration_count += 1;
            debug!(agent = %state.id, iteration = state.iteration_count, "Agent iteration");

            let completion = match self.gateway.chat(self.request_for(state)).await {
                Ok(Some(completion)) => completion,
                Ok(None) => {
                    warn!(agent = %state.id, "API requests disabled, stopping agent run");
                    return Ok(());
                }
                Err(e) => {
                    warn!(agent = %state.id, iteration = state.iteration_count, "Agent run failed: {e}");
                    state.fail(e.to_string());
                    return Err(e);
                }
            };

            let mut calls = completion.response_tool_calls.into_iter();
            let Some(call) = calls.next() else {
                let reply = Message::assistant(completion.raw_response);
                state.record(HistoryEntry::Message(reply), &mut observer);
                warn!(agent = %state.id, "Model reply contained no tool call");
                let corrective = format!(
                    "Error: Previous message contained no tool call. Make a tool call at each step. Available tools: {}",
                    self.tool_names()
                );
                state.record(HistoryEntry::Message(Message::user(corrective)), &mut observer);
                continue;
            };
            let dropped = calls.count();
            if dropped > 0 {
                warn!(agent = %state.id, tool = %call.name, dropped, "Ignoring additional tool calls");
            }

            state.record(HistoryEntry::ToolCall(call.clone()), &mut observer);
            if let Some(answer) = self.dispatch(state, &call, &mut observer).await {
                info!(agent = %state.id, iterations = state.iteration_count, "Agent run completed");
                state.complete(answer);
                return Ok(());
            }
        }

        info!(
            agent = %state.id,
            iterations = state.iteration_count,
            "Iteration limit reached without a final answer"
        );
        Ok(())
    }

    /// Run one tool call and record its result or a corrective message.
    /// Returns the answer when the final-answer tool ran.
    async fn dispatch(
        &self,
        state: &mut AgentState,
        call: &ToolCall,
        observer: &mut Option<&mut Observer<'_>>,
    ) -> Option<String> {
        let context = ToolContext::from_source(format!("agent:{}", state.id));
        let entry = match self.tools.invoke(call, &context).await {
            Ok(invocation) => {
                state.record(HistoryEntry::ToolCallResult(invocation.result), observer);
                return match invocation.outcome {
                    ToolOutcome::FinalAnswer(answer) => Some(answer),
                    ToolOutcome::Observation => None,
                };
            }
            Err(ToolError::NotFound(name) | ToolError::ProviderManaged(name)) => {
                warn!(agent = %state.id, tool = %name, "Model called an unknown tool");
                HistoryEntry::Message(Message::user(format!(
                    "Error: Tool '{name}' not found. Available tools: {}",
                    self.tool_names()
                )))
            }
            Err(ToolError::InvalidArguments { tool_name, schema, reason }) => {
                warn!(agent = %state.id, tool = %tool_name, "Invalid tool arguments: {reason}");
                HistoryEntry::Message(Message::user(format!(
                    "Error: Invalid tool arguments for the tool '{tool_name}'. Tool arguments schema: {schema}"
                )))
            }
            Err(e) => {
                warn!(agent = %state.id, tool = %call.name, "Tool failed: {e}");
                HistoryEntry::ToolCallResult(ToolCallResult::for_call(call, json!({"error": e.to_string()})))
            }
        };
        state.record(entry, observer);
        None
    }

    fn request_for(&self, state: &AgentState) -> CompletionRequest {
        let mut request = CompletionRequest::with_messages(to_messages(&state.history))
            .system_prompt(state.system_prompt.clone())
            .tools(self.tools.definitions().to_vec());
        if let Some(provider) = self.provider {
            request = request.provider(provider);
        }
        if let Some(model) = &self.model {
            request = request.model(model.clone());
        }
        request
    }

    /// Locally invocable tool names, in registration order.
    fn tool_names(&self) -> String {
        self.tools
            .definitions()
            .iter()
            .filter(|d| !d.is_provider_managed())
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
