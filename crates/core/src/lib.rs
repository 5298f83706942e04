//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard completion
//! gateway and agent loop. Every collaborator (provider adapters, state
//! sinks, tool executors) is defined as a trait here; implementations live
//! in their respective crates and all crates depend inward on core.

pub mod error;
pub mod message;
pub mod provider;
pub mod request;
pub mod result;
pub mod sink;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ChatError, Error, Failure, FailureKind, ProviderError, Result, SinkError, ToolError};
pub use message::{Content, ContentPart, MediaSource, Message, Role, ToolCall, ToolCallResult};
pub use provider::{
    EventStream, ProviderAdapter, ProviderKind, StreamEvent, StreamInterpreter, StreamStep,
};
pub use request::{CompletionRequest, PreparedRequest, ResponseFormat, SchemaProvider};
pub use result::{Citation, CompletionResult, ModelPricing, ParsedCompletion, Usage};
pub use sink::StateSink;
pub use tool::{ProviderToolKind, Tool, ToolContext, ToolDefinition, ToolExecutor, ToolVariant};
