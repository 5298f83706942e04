//! `switchyard chat`: run one completion.

use anyhow::Context;
use clap::Args;
use std::io::Write;
use switchyard_core::{CompletionRequest, CompletionResult, Message, StreamEvent};

use super::{build_gateway, load_config, parse_provider};

#[derive(Args)]
pub struct ChatArgs {
    /// Provider to use (defaults to `default_provider` from config)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model to use (defaults to the provider's default model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print text as it streams in
    #[arg(long)]
    pub stream: bool,

    /// Response format: text, json or html
    #[arg(short, long, default_value = "text")]
    pub format: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    #[arg(short, long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// The user message
    pub prompt: String,
}

impl ChatArgs {
    pub fn to_request(&self) -> anyhow::Result<CompletionRequest> {
        let mut request = CompletionRequest::with_message(Message::user(self.prompt.clone()))
            .response_format_named(&self.format)?
            .stream(self.stream);
        if let Some(provider) = parse_provider(self.provider.as_deref())? {
            request = request.provider(provider);
        }
        if let Some(model) = &self.model {
            request = request.model(model.clone());
        }
        if let Some(system) = &self.system {
            request = request.system_prompt(system.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.max_tokens(max_tokens);
        }
        request.validate()?;
        Ok(request)
    }
}

pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let gateway = build_gateway(&config);
    let request = args.to_request()?;

    let result = if args.stream {
        let mut on_delta = |_: &CompletionResult, delta: &str, _: &StreamEvent| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        };
        let result = gateway
            .chat_streaming(request, &mut on_delta)
            .await
            .context("Completion failed")?;
        println!();
        result
    } else {
        let result = gateway.chat(request).await.context("Completion failed")?;
        if let Some(result) = &result {
            println!("{}", result.parsed_response());
        }
        result
    };

    match result {
        Some(result) => eprintln!("{}", usage_line(&result)),
        None => eprintln!("  API requests are disabled (api_requests_enabled = false)"),
    }
    Ok(())
}

/// One-line usage summary printed after the response.
pub fn usage_line(result: &CompletionResult) -> String {
    let mut line = format!(
        "  {}/{}  tokens: {} in, {} out, {} total",
        result.provider, result.model, result.prompt_tokens, result.completion_tokens, result.total_tokens
    );
    match result.cost {
        Some(cost) => line.push_str(&format!("  cost: ${cost:.6}")),
        None => line.push_str("  cost: unknown"),
    }
    if result.retry_count > 0 {
        line.push_str(&format!("  retries: {}", result.retry_count));
    }
    line
}
