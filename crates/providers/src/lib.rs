//! Vendor adapters for Switchyard.
//!
//! Every adapter implements `switchyard_core::ProviderAdapter`. The router
//! selects one by `ProviderKind` from configuration.

pub mod anthropic;
pub mod bedrock;
mod chat_completions;
mod eventstream;
pub mod google;
pub mod http;
pub mod openai_completions;
pub mod openai_responses;
pub mod openrouter;
pub mod router;
mod sse;
mod stream;

pub use anthropic::AnthropicAdapter;
pub use bedrock::BedrockAdapter;
pub use google::GoogleAdapter;
pub use http::ProviderSettings;
pub use openai_completions::OpenAiCompletionsAdapter;
pub use openai_responses::OpenAiResponsesAdapter;
pub use openrouter::OpenRouterAdapter;
pub use router::{ProviderRouter, adapter_for, build_from_config};
