//! Streaming accumulator.
//!
//! Feeds vendor stream events through the adapter's interpreter, keeps the
//! in-progress [`CompletionResult`] current, and hands buffered text to the
//! caller's delta callback in chunks of at least `flush_threshold`
//! characters (or whatever is buffered at a finish point).

use futures::StreamExt;
use switchyard_core::{
    CompletionResult, EventStream, ParsedCompletion, ProviderAdapter, ProviderError, StreamEvent,
    StreamInterpreter,
};
use tracing::trace;

/// Called with the current result, the flushed text and the event that
/// triggered the flush.
pub type DeltaCallback<'a> = dyn FnMut(&CompletionResult, &str, &StreamEvent) + Send + 'a;

pub struct StreamAccumulator<'a> {
    adapter: &'a dyn ProviderAdapter,
    interpreter: Box<dyn StreamInterpreter>,
    buffer: String,
    flush_threshold: usize,
    last_event: Option<StreamEvent>,
}

impl<'a> StreamAccumulator<'a> {
    pub fn new(adapter: &'a dyn ProviderAdapter, flush_threshold: usize) -> Self {
        Self {
            adapter,
            interpreter: adapter.stream_interpreter(),
            buffer: String::new(),
            flush_threshold: flush_threshold.max(1),
            last_event: None,
        }
    }

    /// Text buffered but not yet handed to the callback.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Process one event. Returns true once the vendor signalled the end of
    /// the stream.
    pub fn push(
        &mut self,
        event: StreamEvent,
        result: &mut CompletionResult,
        on_delta: Option<&mut DeltaCallback<'_>>,
    ) -> Result<bool, ProviderError> {
        let step = self.interpreter.interpret(&event)?;
        trace!(event = ?event.event_type(), delta = ?step.delta, "Stream event");

        if let Some(delta) = &step.delta {
            self.buffer.push_str(delta);
            result.raw_response.push_str(delta);
        }
        if step.is_flush_point() {
            self.apply_snapshot(result)?;
        }
        if step.is_flush_point() || self.buffer.chars().count() >= self.flush_threshold {
            self.flush(result, &event, on_delta);
        }
        self.last_event = Some(event);
        Ok(step.end_of_stream)
    }

    /// Apply the final snapshot and flush whatever is still buffered.
    pub fn finish(
        &mut self,
        result: &mut CompletionResult,
        on_delta: Option<&mut DeltaCallback<'_>>,
    ) -> Result<(), ProviderError> {
        self.apply_snapshot(result)?;
        let event = self.last_event.take().unwrap_or_else(StreamEvent::done);
        self.flush(result, &event, on_delta);
        Ok(())
    }

    /// Drain `stream` into `result`. Any partial state from an earlier
    /// attempt is cleared first.
    pub async fn consume(
        mut self,
        mut stream: EventStream,
        result: &mut CompletionResult,
        mut on_delta: Option<&mut DeltaCallback<'_>>,
    ) -> Result<(), ProviderError> {
        result.apply(ParsedCompletion::default());
        while let Some(event) = stream.next().await {
            if self.push(event?, result, on_delta.as_deref_mut())? {
                break;
            }
        }
        self.finish(result, on_delta)
    }

    fn apply_snapshot(&self, result: &mut CompletionResult) -> Result<(), ProviderError> {
        let parsed = self.adapter.parse_response(&self.interpreter.snapshot())?;
        result.apply(parsed);
        Ok(())
    }

    fn flush(
        &mut self,
        result: &CompletionResult,
        event: &StreamEvent,
        on_delta: Option<&mut DeltaCallback<'_>>,
    ) {
        if self.buffer.is_empty() {
            return;
        }
        if let Some(callback) = on_delta {
            callback(result, &self.buffer, event);
        }
        self.buffer.clear();
    }
}
