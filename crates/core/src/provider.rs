//! Provider adapter trait: the seam between the gateway and one vendor API.
//!
//! An adapter knows how to turn a [`PreparedRequest`] into the vendor's JSON
//! payload, send it (whole or streaming), and turn the vendor's response back
//! into a [`ParsedCompletion`]. Adapters are selected by [`ProviderKind`] at
//! configuration time.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProviderError;
use crate::message::Message;
use crate::request::PreparedRequest;
use crate::result::ParsedCompletion;
use crate::tool::{ProviderToolKind, ToolDefinition};

/// Identifies a vendor API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    Bedrock,
    Google,
    OpenaiCompletions,
    OpenaiResponses,
    Openrouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Anthropic,
        ProviderKind::Bedrock,
        ProviderKind::Google,
        ProviderKind::OpenaiCompletions,
        ProviderKind::OpenaiResponses,
        ProviderKind::Openrouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
            Self::Google => "google",
            Self::OpenaiCompletions => "openai_completions",
            Self::OpenaiResponses => "openai_responses",
            Self::Openrouter => "openrouter",
        }
    }

    /// Vendor prefix used for pricing lookups.
    pub fn pricing_prefix(&self) -> &'static str {
        match self {
            Self::Anthropic | Self::Bedrock => "anthropic",
            Self::Google => "google",
            Self::OpenaiCompletions | Self::OpenaiResponses => "openai",
            Self::Openrouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "bedrock" | "aws_bedrock" => Ok(Self::Bedrock),
            "google" | "gemini" => Ok(Self::Google),
            "openai" | "openai_completions" => Ok(Self::OpenaiCompletions),
            "openai_responses" => Ok(Self::OpenaiResponses),
            "openrouter" => Ok(Self::Openrouter),
            other => Err(ProviderError::NotConfigured(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

/// One decoded frame from a vendor stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Event type from the framing layer (SSE `event:` or the event-stream
    /// `:event-type` header), when the vendor sends one.
    pub event: Option<String>,
    pub data: serde_json::Value,
    /// Set for the vendor's end-of-stream sentinel (e.g. `data: [DONE]`).
    pub terminal: bool,
}

impl StreamEvent {
    pub fn new(event: Option<String>, data: serde_json::Value) -> Self {
        Self {
            event,
            data,
            terminal: false,
        }
    }

    pub fn done() -> Self {
        Self {
            event: None,
            data: serde_json::Value::Null,
            terminal: true,
        }
    }

    /// The event type, from the framing layer or the payload's `type` field.
    pub fn event_type(&self) -> Option<&str> {
        self.event
            .as_deref()
            .or_else(|| self.data.get("type").and_then(|t| t.as_str()))
    }
}

/// A stream of decoded vendor events.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ProviderError>>;

/// What one stream event means to the accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStep {
    /// Text produced by this event
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
    pub end_of_stream: bool,
}

impl StreamStep {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn finished(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn end() -> Self {
        Self {
            end_of_stream: true,
            ..Self::default()
        }
    }

    pub fn is_flush_point(&self) -> bool {
        self.end_of_stream || self.finish_reason.is_some()
    }
}

/// Interprets a vendor's stream events one at a time and keeps a running
/// snapshot shaped like the vendor's non-streaming response body, so the
/// adapter's `parse_response` can read it.
pub trait StreamInterpreter: Send {
    fn interpret(&mut self, event: &StreamEvent) -> Result<StreamStep, ProviderError>;

    fn snapshot(&self) -> serde_json::Value;
}

/// The variant contract every vendor adapter implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model used when the request names none.
    fn default_model(&self) -> &str;

    fn default_temperature(&self) -> f32 {
        0.7
    }

    fn default_max_tokens(&self) -> u32 {
        4096
    }

    /// Vendor-hosted tools this adapter can declare.
    fn supported_provider_tools(&self) -> &[ProviderToolKind] {
        &[]
    }

    /// Reject provider-managed tools outside the supported set.
    fn check_provider_tools(&self, tools: &[ToolDefinition]) -> Result<(), ProviderError> {
        for tool in tools {
            if let Some(kind) = tool.provider_kind()
                && !self.supported_provider_tools().contains(&kind)
            {
                return Err(ProviderError::UnsupportedFeature {
                    provider: self.kind().to_string(),
                    feature: format!("provider-managed tool '{kind}'"),
                });
            }
        }
        Ok(())
    }

    /// Translate generic messages into the vendor's message list.
    fn format_messages(&self, messages: &[Message]) -> Result<serde_json::Value, ProviderError>;

    /// Build the complete request payload.
    fn build_request_parameters(
        &self,
        request: &PreparedRequest,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn send(
        &self,
        request: &PreparedRequest,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn send_streaming(
        &self,
        request: &PreparedRequest,
        payload: &serde_json::Value,
    ) -> Result<EventStream, ProviderError>;

    /// Extract text, tool calls, citations and usage from a response body.
    fn parse_response(&self, body: &serde_json::Value) -> Result<ParsedCompletion, ProviderError>;

    /// A fresh interpreter for one streamed response.
    fn stream_interpreter(&self) -> Box<dyn StreamInterpreter>;
}
