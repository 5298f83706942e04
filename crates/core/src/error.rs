//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; every error can be reduced
//! to a [`FailureKind`] so that a terminal failure can be persisted without
//! the original error object.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("State sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length of a persisted failure message, in characters.
pub const FAILURE_MESSAGE_LIMIT: usize = 255;

/// Coarse classification of a failure, persisted alongside a completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    UnsupportedFeature,
    Timeout,
    Connection,
    ServerError,
    RateLimited,
    Authentication,
    ClientError,
    StreamingProtocol,
    InvalidResponse,
    NotConfigured,
    StateSink,
}

impl FailureKind {
    /// The kinds retried by default: transport timeouts, connection
    /// failures and 5xx-class responses.
    pub const DEFAULT_RETRIABLE: [FailureKind; 3] = [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::ServerError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::UnsupportedFeature => "unsupported_feature",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::ServerError => "server_error",
            Self::RateLimited => "rate_limited",
            Self::Authentication => "authentication",
            Self::ClientError => "client_error",
            Self::StreamingProtocol => "streaming_protocol",
            Self::InvalidResponse => "invalid_response",
            Self::NotConfigured => "not_configured",
            Self::StateSink => "state_sink",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted failure: kind plus a message bounded to
/// [`FAILURE_MESSAGE_LIMIT`] characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: truncate_chars(message.as_ref(), FAILURE_MESSAGE_LIMIT),
        }
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed stream event: {0}")]
    StreamProtocol(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{provider} does not support {feature}")]
    UnsupportedFeature { provider: String, feature: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ApiError { status_code, .. } if *status_code >= 500 => FailureKind::ServerError,
            Self::ApiError { .. } => FailureKind::ClientError,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::AuthenticationFailed(_) => FailureKind::Authentication,
            Self::StreamInterrupted(_) | Self::Network(_) => FailureKind::Connection,
            Self::StreamProtocol(_) => FailureKind::StreamingProtocol,
            Self::InvalidResponse(_) => FailureKind::InvalidResponse,
            Self::UnsupportedFeature { .. } => FailureKind::UnsupportedFeature,
            Self::NotConfigured(_) => FailureKind::NotConfigured,
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Errors raised by the chat gateway.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ChatError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Provider(e) => e.kind(),
            Self::Sink(_) => FailureKind::StateSink,
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for tool '{tool_name}': {reason}")]
    InvalidArguments {
        tool_name: String,
        schema: serde_json::Value,
        reason: String,
    },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool '{0}' is executed by the provider and cannot be invoked locally")]
    ProviderManaged(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
