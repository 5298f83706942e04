//! Turns a response byte stream into decoded vendor events.
//!
//! Decoding happens on the task that polls the stream; nothing is spawned.

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use switchyard_core::error::ProviderError;
use switchyard_core::{EventStream, StreamEvent};

/// Incremental decoder for one framing protocol.
pub(crate) trait FrameDecoder: Send + 'static {
    /// Feed raw bytes, returning every event completed by them.
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, ProviderError>>;

    /// Called once the byte stream ends.
    fn finish(&mut self) -> Vec<Result<StreamEvent, ProviderError>>;
}

struct DecodeState<D> {
    bytes: BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: D,
    pending: VecDeque<Result<StreamEvent, ProviderError>>,
    finished: bool,
}

/// Decode `bytes` with `decoder`. The stream ends after the first error.
pub(crate) fn decode_stream<S, B, E, D>(bytes: S, decoder: D) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
    D: FrameDecoder,
{
    let bytes = bytes
        .map(|chunk| chunk.map(|b| b.as_ref().to_vec()).map_err(|e| e.to_string()))
        .boxed();
    let state = DecodeState {
        bytes,
        decoder,
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.push(&chunk)),
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(ProviderError::StreamInterrupted(e)));
                    state.finished = true;
                }
                None => {
                    state.pending.extend(state.decoder.finish());
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Decode an HTTP response body.
pub(crate) fn decode_response<D: FrameDecoder>(response: reqwest::Response, decoder: D) -> EventStream {
    decode_stream(response.bytes_stream(), decoder)
}

/// The element at `index` of a JSON array, creating the array and
/// appending one empty object as needed. Vendors open indexed entries in
/// order, so an index past the end of the list is a protocol error.
pub(crate) fn slot(list: &mut serde_json::Value, index: u64) -> Result<&mut serde_json::Value, ProviderError> {
    if !list.is_array() {
        *list = serde_json::Value::Array(Vec::new());
    }
    let items = list.as_array_mut().ok_or_else(|| out_of_range(index))?;
    let position = usize::try_from(index).map_err(|_| out_of_range(index))?;
    if position == items.len() {
        items.push(serde_json::json!({}));
    }
    items.get_mut(position).ok_or_else(|| out_of_range(index))
}

pub(crate) fn out_of_range(index: u64) -> ProviderError {
    ProviderError::StreamProtocol(format!("content block index out of range: {index}"))
}

/// Append `text` to a string field in place, replacing anything that is
/// not a string.
pub(crate) fn append_text(field: &mut serde_json::Value, text: &str) {
    match field {
        serde_json::Value::String(existing) => existing.push_str(text),
        other => *other = serde_json::Value::String(text.to_string()),
    }
}
