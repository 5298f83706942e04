//! Message domain types.
//!
//! These are the value objects that flow through the whole system: the agent
//! loop builds them, the gateway hands them to an adapter, and the adapter
//! turns them into one vendor's wire shape. A message is either plain text or
//! an ordered list of content parts (text, image, file, tool call, tool result).

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries tool results and corrective messages)
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
}

/// Where an image or file comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

impl MediaSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Base64 {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Render as a `data:` URL (base64) or the plain URL.
    pub fn to_url(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a structured JSON document
    pub arguments: serde_json::Value,

    /// Vendor-issued correlation id (absent for vendors that don't emit one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_call_id: Option<String>,

    /// Natural-language text the model produced alongside the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            provider_call_id: None,
            assistant_message: None,
        }
    }

    pub fn with_call_id(mut self, id: impl Into<String>) -> Self {
        self.provider_call_id = Some(id.into());
        self
    }

    pub fn with_assistant_message(mut self, text: impl Into<String>) -> Self {
        self.assistant_message = Some(text.into());
        self
    }

    /// The correlation id to put on the wire. Vendors that require one get a
    /// stable id derived from the tool name when the model did not issue one.
    pub fn wire_id(&self) -> String {
        self.provider_call_id
            .clone()
            .unwrap_or_else(|| format!("call_{}", self.name))
    }
}

/// The outcome of a tool call, echoed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_call_id: Option<String>,

    /// Name of the tool that produced this result
    pub name: String,

    /// Opaque structured value or text
    pub result: serde_json::Value,
}

impl ToolCallResult {
    /// A result answering `call`.
    pub fn for_call(call: &ToolCall, result: serde_json::Value) -> Self {
        Self {
            provider_call_id: call.provider_call_id.clone(),
            name: call.name.clone(),
            result,
        }
    }

    pub fn wire_id(&self) -> String {
        self.provider_call_id
            .clone()
            .unwrap_or_else(|| format!("call_{}", self.name))
    }

    /// The result rendered as text (strings unquoted, everything else as JSON).
    pub fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One element of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        source: MediaSource,
    },
    File {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    ToolCall(ToolCall),
    ToolCallResult(ToolCallResult),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Message body: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn new(role: Role, content: Content) -> Self {
        Self { role, content }
    }

    /// Create a new user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Create a new system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self::new(role, Content::Parts(parts))
    }

    /// An assistant turn carrying one tool call and its accompanying text.
    pub fn assistant_tool_call(call: ToolCall) -> Self {
        let mut parts = Vec::new();
        if let Some(text) = call.assistant_message.as_ref().filter(|t| !t.is_empty()) {
            parts.push(ContentPart::text(text.clone()));
        }
        parts.push(ContentPart::ToolCall(call));
        Self::with_parts(Role::Assistant, parts)
    }

    /// A user turn carrying a tool result.
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::ToolCallResult(result)])
    }

    /// The content as an ordered list of parts.
    pub fn parts(&self) -> Vec<ContentPart> {
        match &self.content {
            Content::Text(text) => vec![ContentPart::text(text.clone())],
            Content::Parts(parts) => parts.clone(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        match &self.content {
            Content::Text(_) => Vec::new(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolCall(call) => Some(call),
                    _ => None,
                })
                .collect(),
        }
    }
}
