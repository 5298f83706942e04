//! Completion results.
//!
//! A [`CompletionResult`] is created once per gateway call, mutated in place
//! while a response streams in, and finalized (totals reconciled, cost
//! computed) before it is handed back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Failure;
use crate::message::ToolCall;
use crate::provider::ProviderKind;
use crate::request::{JSON_RESPONSE_TOOL, ResponseFormat};

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A source the model cited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    pub fn input_cost(&self, tokens: u32) -> f64 {
        tokens as f64 * self.input_per_m / 1_000_000.0
    }

    pub fn output_cost(&self, tokens: u32) -> f64 {
        tokens as f64 * self.output_per_m / 1_000_000.0
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.input_cost(input_tokens) + self.output_cost(output_tokens)
    }
}

/// What an adapter extracted from one vendor response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCompletion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub citations: Vec<Citation>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    pub response_id: Option<String>,
    pub model: Option<String>,
}

impl ParsedCompletion {
    /// Final clean-up every adapter applies after parsing.
    ///
    /// If the model answered through the `json_response` tool, that call
    /// becomes the response text and is removed from the tool calls. Otherwise
    /// free text produced next to tool calls is attached to each call as its
    /// `assistant_message`, so the turn can be replayed verbatim.
    pub fn normalize(mut self) -> Self {
        if let Some(idx) = self
            .tool_calls
            .iter()
            .position(|c| c.name == JSON_RESPONSE_TOOL)
        {
            let call = self.tool_calls.remove(idx);
            self.text = call.arguments.to_string();
            return self;
        }
        let text = self.text.trim();
        if !text.is_empty() {
            for call in self.tool_calls.iter_mut().filter(|c| c.assistant_message.is_none()) {
                call.assistant_message = Some(text.to_string());
            }
        }
        self
    }
}

/// The normalized outcome of one gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Identifier assigned by the state sink
    #[serde(default)]
    pub id: String,
    pub provider: ProviderKind,
    pub model: String,
    pub response_format: ResponseFormat,
    pub stream_response: bool,

    /// Text, or JSON-serialized structured output
    #[serde(default)]
    pub raw_response: String,
    #[serde(default)]
    pub response_tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub citations: Vec<Citation>,

    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_token_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_token_cost: Option<f64>,
    /// Total cost in USD, `None` when the model has no known pricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    /// Vendor-issued response id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl CompletionResult {
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        response_format: ResponseFormat,
        stream_response: bool,
    ) -> Self {
        Self {
            id: String::new(),
            provider,
            model: model.into(),
            response_format,
            stream_response,
            raw_response: String::new(),
            response_tool_calls: Vec::new(),
            citations: Vec::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            prompt_token_cost: None,
            output_token_cost: None,
            cost: None,
            retry_count: 0,
            failure: None,
            response_id: None,
            finish_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        }
    }

    /// Overwrite the response fields with what the adapter parsed. Usage
    /// counters are only replaced when the vendor reported them.
    pub fn apply(&mut self, parsed: ParsedCompletion) {
        self.raw_response = parsed.text;
        self.response_tool_calls = parsed.tool_calls;
        self.citations.clear();
        for citation in parsed.citations {
            self.add_citation(citation);
        }
        if let Some(usage) = parsed.usage {
            self.prompt_tokens = usage.prompt_tokens;
            self.completion_tokens = usage.completion_tokens;
            self.total_tokens = usage.total_tokens;
        }
        if parsed.finish_reason.is_some() {
            self.finish_reason = parsed.finish_reason;
        }
        if parsed.response_id.is_some() {
            self.response_id = parsed.response_id;
        }
    }

    /// Add a citation unless one with the same URL is already present.
    pub fn add_citation(&mut self, citation: Citation) {
        if !self.citations.iter().any(|c| c.url == citation.url) {
            self.citations.push(citation);
        }
    }

    /// Reconcile token totals and compute cost.
    pub fn finalize(&mut self, pricing: Option<ModelPricing>) {
        let sum = self.prompt_tokens.saturating_add(self.completion_tokens);
        if self.total_tokens < sum {
            self.total_tokens = sum;
        }
        match pricing {
            Some(p) => {
                let input = p.input_cost(self.prompt_tokens);
                let output = p.output_cost(self.completion_tokens);
                self.prompt_token_cost = Some(input);
                self.output_token_cost = Some(output);
                self.cost = Some(input + output);
            }
            None => {
                self.prompt_token_cost = None;
                self.output_token_cost = None;
                self.cost = None;
            }
        }
        if self.failure.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, failure: Failure) {
        self.failure = Some(failure);
        self.failed_at = Some(Utc::now());
        self.completed_at = None;
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// The response as the caller asked for it: trimmed text, or the body
    /// of a Markdown code fence for json and html.
    pub fn parsed_response(&self) -> String {
        match self.response_format {
            ResponseFormat::Text => self.raw_response.trim().to_string(),
            ResponseFormat::Json | ResponseFormat::Html => {
                strip_code_fence(&self.raw_response).to_string()
            }
        }
    }

    /// The response decoded as JSON.
    pub fn parsed_json(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(strip_code_fence(&self.raw_response))
    }
}

/// Strip a surrounding Markdown code fence (```json ... ```) if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    match body.find('\n') {
        Some(idx) => body[idx + 1..].trim(),
        None => body.trim(),
    }
}
