//! Tool definitions and the execution seams.
//!
//! A [`ToolDefinition`] is what gets declared to the model. Developer-managed
//! tools are carried out by the host, either through a local [`Tool`]
//! implementation or through the injected [`ToolExecutor`]. Provider-managed
//! tools (hosted web search and friends) are only declared; the vendor runs
//! them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ToolError;

/// Capabilities a vendor can run on its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderToolKind {
    WebSearch,
    CodeExecution,
    ImageGeneration,
}

impl fmt::Display for ProviderToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WebSearch => "web_search",
            Self::CodeExecution => "code_execution",
            Self::ImageGeneration => "image_generation",
        };
        f.write_str(name)
    }
}

/// Who executes a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "managed_by", content = "capability", rename_all = "snake_case")]
pub enum ToolVariant {
    #[default]
    Developer,
    Provider(ProviderToolKind),
}

/// A tool declaration sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name, unique within a request
    pub name: String,

    /// What the tool does (sent to the model)
    pub description: String,

    /// JSON Schema describing the tool's arguments
    pub arguments_schema: serde_json::Value,

    #[serde(default)]
    pub variant: ToolVariant,
}

impl ToolDefinition {
    /// A developer-managed tool.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments_schema,
            variant: ToolVariant::Developer,
        }
    }

    /// A vendor-hosted capability.
    pub fn provider_managed(kind: ProviderToolKind) -> Self {
        Self {
            name: kind.to_string(),
            description: String::new(),
            arguments_schema: serde_json::json!({"type": "object"}),
            variant: ToolVariant::Provider(kind),
        }
    }

    pub fn provider_kind(&self) -> Option<ProviderToolKind> {
        match self.variant {
            ToolVariant::Provider(kind) => Some(kind),
            ToolVariant::Developer => None,
        }
    }

    pub fn is_provider_managed(&self) -> bool {
        self.provider_kind().is_some()
    }
}

/// Opaque context handed to the executor alongside a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    /// Identifies who triggered the call (an agent run, a task id, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ToolContext {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }
}

/// The injected collaborator that carries out developer-managed tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        context: &ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

/// A tool implemented in-process.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(
        &self,
        arguments: &serde_json::Value,
        context: &ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}
