//! Completion requests.
//!
//! [`CompletionRequest`] is what callers build; [`CompletionRequest::validate`]
//! is a pure check run by the gateway before anything touches the network.
//! [`PreparedRequest`] is the normalized form handed to a provider adapter
//! once defaults are resolved.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ChatError;
use crate::message::Message;
use crate::provider::ProviderKind;
use crate::tool::ToolDefinition;

/// Name of the synthetic tool used to coerce structured JSON output.
pub const JSON_RESPONSE_TOOL: &str = "json_response";

const JSON_INSTRUCTION: &str =
    "Respond only with a single valid JSON object. Do not include any text outside of the JSON.";
const HTML_INSTRUCTION: &str =
    "Respond only with HTML. Do not wrap the HTML in Markdown code fences.";

/// Expected shape of the model's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Html,
}

impl FromStr for ResponseFormat {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            other => Err(ChatError::Validation(format!(
                "response format must be one of text, json, html (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Html => "html",
        })
    }
}

/// Supplies the JSON schema for structured responses when the caller does
/// not pass one directly.
pub trait SchemaProvider: Send + Sync {
    fn response_schema(&self) -> Option<serde_json::Value>;
}

/// A caller-facing completion request.
#[derive(Clone, Default)]
pub struct CompletionRequest {
    /// Overrides the gateway's configured provider
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    /// A single message (mutually exclusive with `messages`)
    pub message: Option<Message>,
    /// A message list (mutually exclusive with `message`)
    pub messages: Option<Vec<Message>>,
    pub system_prompt: Option<String>,
    pub response_format: ResponseFormat,
    pub json_schema: Option<serde_json::Value>,
    pub schema_provider: Option<Arc<dyn SchemaProvider>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub available_tools: Vec<ToolDefinition>,
    /// Forces the model to call this tool
    pub tool_choice: Option<String>,
    pub stream: bool,
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("message", &self.message)
            .field("messages", &self.messages)
            .field("system_prompt", &self.system_prompt)
            .field("response_format", &self.response_format)
            .field("json_schema", &self.json_schema)
            .field("schema_provider", &self.schema_provider.as_ref().map(|_| "<dyn SchemaProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("available_tools", &self.available_tools)
            .field("tool_choice", &self.tool_choice)
            .field("stream", &self.stream)
            .finish()
    }
}

impl CompletionRequest {
    /// A request carrying a single message.
    pub fn with_message(message: Message) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }

    /// A request carrying a message list.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Set the response format from its textual name.
    pub fn response_format_named(self, name: &str) -> Result<Self, ChatError> {
        Ok(self.response_format(name.parse()?))
    }

    pub fn json_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    pub fn schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.schema_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.available_tools = tools;
        self
    }

    pub fn tool_choice(mut self, name: impl Into<String>) -> Self {
        self.tool_choice = Some(name.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Check the request without side effects.
    pub fn validate(&self) -> Result<(), ChatError> {
        match (&self.message, &self.messages) {
            (Some(_), Some(_)) => {
                return Err(ChatError::Validation(
                    "provide either a single message or a message list, not both".into(),
                ));
            }
            (None, None) => {
                return Err(ChatError::Validation(
                    "a single message or a message list is required".into(),
                ));
            }
            (None, Some(list)) if list.is_empty() => {
                return Err(ChatError::Validation("message list must not be empty".into()));
            }
            _ => {}
        }

        for (i, tool) in self.available_tools.iter().enumerate() {
            if self.available_tools[..i].iter().any(|t| t.name == tool.name) {
                return Err(ChatError::Validation(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
        }

        if let Some(choice) = &self.tool_choice
            && !self.available_tools.iter().any(|t| &t.name == choice)
        {
            return Err(ChatError::Validation(format!(
                "tool_choice '{choice}' is not one of the available tools"
            )));
        }

        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ChatError::Validation(format!(
                "temperature must be between 0.0 and 2.0 (got {t})"
            )));
        }

        if self.max_tokens == Some(0) {
            return Err(ChatError::Validation("max_tokens must be greater than 0".into()));
        }

        Ok(())
    }

    /// The conversation as a list, whichever form was supplied.
    pub fn conversation(&self) -> Vec<Message> {
        match (&self.message, &self.messages) {
            (Some(m), _) => vec![m.clone()],
            (None, Some(list)) => list.clone(),
            (None, None) => Vec::new(),
        }
    }

    /// The schema for structured output, direct or from the schema provider.
    pub fn response_schema(&self) -> Option<serde_json::Value> {
        self.json_schema
            .clone()
            .or_else(|| self.schema_provider.as_ref().and_then(|p| p.response_schema()))
    }
}

/// A request with every default resolved, ready for an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub response_format: ResponseFormat,
    pub response_schema: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<String>,
    pub stream: bool,
}

impl PreparedRequest {
    /// Structured JSON output through a forced `json_response` tool.
    pub fn wants_json_tool(&self) -> bool {
        self.response_format == ResponseFormat::Json && self.response_schema.is_some()
    }

    /// System prompt with a format instruction appended where the adapter
    /// cannot coerce the format natively.
    pub fn system_prompt_with_format_hint(&self) -> Option<String> {
        let hint = match self.response_format {
            ResponseFormat::Json if self.response_schema.is_none() => Some(JSON_INSTRUCTION),
            ResponseFormat::Html => Some(HTML_INSTRUCTION),
            _ => None,
        };
        match (&self.system_prompt, hint) {
            (Some(prompt), Some(hint)) => Some(format!("{prompt}\n\n{hint}")),
            (None, Some(hint)) => Some(hint.to_string()),
            (prompt, None) => prompt.clone(),
        }
    }

    /// Tools the caller's code executes.
    pub fn developer_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(|t| !t.is_provider_managed())
    }

    /// Vendor-hosted tools declared on the request.
    pub fn provider_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(|t| t.is_provider_managed())
    }

    /// The synthetic `json_response` tool, when structured output is
    /// coerced through a forced tool call.
    pub fn json_response_tool(&self) -> Option<ToolDefinition> {
        if !self.wants_json_tool() {
            return None;
        }
        self.response_schema.as_ref().map(|schema| {
            ToolDefinition::new(
                JSON_RESPONSE_TOOL,
                "Respond with the final answer as structured JSON matching this schema.",
                schema.clone(),
            )
        })
    }

    /// Developer-managed tools, plus the synthetic `json_response` tool
    /// when structured output is requested.
    pub fn function_tools(&self) -> Vec<ToolDefinition> {
        self.developer_tools()
            .cloned()
            .chain(self.json_response_tool())
            .collect()
    }

    /// The tool the model must call, if any. A structured-output request
    /// forces `json_response` unless the caller chose a tool explicitly.
    pub fn forced_tool(&self) -> Option<&str> {
        match &self.tool_choice {
            Some(name) => Some(name.as_str()),
            None if self.wants_json_tool() => Some(JSON_RESPONSE_TOOL),
            None => None,
        }
    }
}
