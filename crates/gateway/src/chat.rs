//! The chat gateway: one entry point for completions across every vendor.
//!
//! A call is validated without side effects, resolved to an adapter, recorded
//! through the state sink, then sent (or streamed) under the retry policy.
//! Every call that reaches the sink leaves exactly one record, whether it
//! succeeds or fails.

use std::sync::Arc;
use switchyard_config::AppConfig;
use switchyard_core::{
    ChatError, CompletionRequest, CompletionResult, ModelPricing, PreparedRequest, ProviderAdapter,
    ProviderError, ProviderKind, ResponseFormat, StateSink,
};
use switchyard_providers::{ProviderRouter, build_from_config};
use switchyard_telemetry::PricingTable;
use tracing::{debug, info, warn};

use crate::retry::{RetryOutcome, RetryPolicy};
use crate::streaming::{DeltaCallback, StreamAccumulator};

const DEFAULT_FLUSH_THRESHOLD: usize = 25;

pub struct ChatGateway {
    router: ProviderRouter,
    sink: Arc<dyn StateSink>,
    pricing: PricingTable,
    retry: RetryPolicy,
    flush_threshold: usize,
    default_model: Option<String>,
    api_requests_enabled: bool,
}

impl ChatGateway {
    /// A gateway with default retry, streaming and pricing settings.
    pub fn new(router: ProviderRouter, sink: Arc<dyn StateSink>) -> Self {
        Self {
            router,
            sink,
            pricing: PricingTable::with_defaults(),
            retry: RetryPolicy::default(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            default_model: None,
            api_requests_enabled: true,
        }
    }

    /// Build every adapter, the pricing table and the retry policy from
    /// configuration.
    pub fn from_config(config: &AppConfig, sink: Arc<dyn StateSink>) -> Self {
        let pricing = PricingTable::with_defaults();
        for (key, price) in &config.pricing {
            pricing.set(key.clone(), ModelPricing::new(price.input_per_m, price.output_per_m));
        }
        Self::new(build_from_config(config), sink)
            .with_pricing(pricing)
            .with_retry_policy(RetryPolicy::from(&config.retry))
            .with_flush_threshold(config.streaming.flush_threshold)
            .with_default_model(config.default_model.clone())
            .with_api_requests_enabled(config.api_requests_enabled)
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Model used for the default provider when a request names none.
    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_api_requests_enabled(mut self, enabled: bool) -> Self {
        self.api_requests_enabled = enabled;
        self
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn sink(&self) -> &Arc<dyn StateSink> {
        &self.sink
    }

    /// Run one completion.
    ///
    /// Returns `Ok(None)` without touching the network or the sink when API
    /// requests are disabled.
    pub async fn chat(&self, request: CompletionRequest) -> Result<Option<CompletionResult>, ChatError> {
        self.run(request, None).await
    }

    /// Run one completion, streaming when the request asks for it. Flushed
    /// text is handed to `on_delta` as it arrives.
    pub async fn chat_streaming(
        &self,
        request: CompletionRequest,
        on_delta: &mut DeltaCallback<'_>,
    ) -> Result<Option<CompletionResult>, ChatError> {
        self.run(request, Some(on_delta)).await
    }

    async fn run(
        &self,
        request: CompletionRequest,
        mut on_delta: Option<&mut DeltaCallback<'_>>,
    ) -> Result<Option<CompletionResult>, ChatError> {
        request.validate()?;

        if !self.api_requests_enabled {
            info!("API requests disabled, skipping completion");
            return Ok(None);
        }

        let adapter = self.resolve(request.provider)?;
        adapter.check_provider_tools(&request.available_tools)?;
        let prepared = self.prepare(&request, adapter.as_ref());

        let mut result = CompletionResult::new(
            adapter.kind(),
            prepared.model.clone(),
            prepared.response_format,
            prepared.stream,
        );
        result.id = self.sink.create(&result).await?;
        debug!(
            id = %result.id,
            provider = %adapter.kind(),
            model = %prepared.model,
            stream = prepared.stream,
            "Completion started"
        );

        let outcome = match adapter.build_request_parameters(&prepared) {
            Ok(payload) => {
                self.retry
                    .run(async |attempt| {
                        debug!(id = %result.id, attempt, "Sending attempt");
                        if prepared.stream {
                            let stream = adapter.send_streaming(&prepared, &payload).await?;
                            StreamAccumulator::new(adapter.as_ref(), self.flush_threshold)
                                .consume(stream, &mut result, on_delta.as_deref_mut())
                                .await?;
                        } else {
                            let body = adapter.send(&prepared, &payload).await?;
                            result.apply(adapter.parse_response(&body)?);
                        }
                        Ok::<(), ChatError>(())
                    })
                    .await
            }
            Err(e) => RetryOutcome {
                result: Err(e.into()),
                retry_count: 0,
            },
        };

        result.retry_count = outcome.retry_count;
        let pricing = self.pricing.lookup(result.provider, &result.model);

        match outcome.result {
            Ok(()) => {
                result.finalize(pricing);
                self.sink.update(&result.id, &result).await?;
                info!(
                    id = %result.id,
                    provider = %result.provider,
                    model = %result.model,
                    tokens = result.total_tokens,
                    retries = result.retry_count,
                    "Completion finished"
                );
                Ok(Some(result))
            }
            Err(err) => {
                let failure = err.to_failure();
                result.fail(failure.clone());
                result.finalize(pricing);
                if let Err(sink_err) = self.sink.update(&result.id, &result).await {
                    warn!(id = %result.id, error = %sink_err, "Failed to store partial result");
                }
                if let Err(sink_err) = self
                    .sink
                    .mark_failed(&result.id, &failure, result.retry_count)
                    .await
                {
                    warn!(id = %result.id, error = %sink_err, "Failed to record failure");
                }
                warn!(
                    id = %result.id,
                    kind = %failure.kind,
                    retries = result.retry_count,
                    error = %err,
                    "Completion failed"
                );
                Err(err)
            }
        }
    }

    fn resolve(&self, provider: Option<ProviderKind>) -> Result<Arc<dyn ProviderAdapter>, ChatError> {
        let kind = provider.unwrap_or(self.router.default_provider());
        self.router.get(kind).ok_or_else(|| {
            ProviderError::NotConfigured(format!("no adapter registered for {kind}")).into()
        })
    }

    /// Resolve model, temperature and token defaults for `adapter`.
    fn prepare(&self, request: &CompletionRequest, adapter: &dyn ProviderAdapter) -> PreparedRequest {
        let configured_default = self
            .default_model
            .clone()
            .filter(|_| adapter.kind() == self.router.default_provider());
        let response_schema = match request.response_format {
            ResponseFormat::Json => request.response_schema(),
            _ => None,
        };
        PreparedRequest {
            model: request
                .model
                .clone()
                .or(configured_default)
                .unwrap_or_else(|| adapter.default_model().to_string()),
            messages: request.conversation(),
            system_prompt: request.system_prompt.clone(),
            response_format: request.response_format,
            response_schema,
            temperature: request.temperature.unwrap_or_else(|| adapter.default_temperature()),
            max_tokens: request.max_tokens.unwrap_or_else(|| adapter.default_max_tokens()),
            tools: request.available_tools.clone(),
            tool_choice: request.tool_choice.clone(),
            stream: request.stream,
        }
    }
}
