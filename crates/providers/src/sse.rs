//! Server-Sent Events decoding.
//!
//! Frames are `event:` / `data:` lines terminated by a blank line. A
//! `data: [DONE]` frame is the end-of-stream sentinel; any other payload
//! must be JSON or the stream is rejected as malformed.

use switchyard_core::StreamEvent;
use switchyard_core::error::ProviderError;
use tracing::trace;

use crate::stream::FrameDecoder;

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    fn take_frame(&mut self) -> Option<Result<StreamEvent, ProviderError>> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(parse_frame(event, &data))
    }

    fn process_line(&mut self, line: &str) -> Option<Result<StreamEvent, ProviderError>> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

impl FrameDecoder for SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, ProviderError>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<Result<StreamEvent, ProviderError>> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).to_string();
            if let Some(event) = self.process_line(rest.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events.extend(self.take_frame());
        events
    }
}

fn parse_frame(event: Option<String>, data: &str) -> Result<StreamEvent, ProviderError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamEvent::done());
    }
    trace!(event = ?event, data = %data, "SSE frame");
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::StreamProtocol(format!("unparseable event payload: {e}: {data}")))?;
    Ok(StreamEvent::new(event, value))
}
