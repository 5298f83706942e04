//! AWS event-stream decoding (Bedrock `converse-stream`).
//!
//! Each message is binary framed:
//!
//! ```text
//! [total_len u32][headers_len u32][prelude_crc u32][headers][payload][message_crc u32]
//! ```
//!
//! Headers are `[name_len u8][name][type u8][value]`. The `:message-type`
//! header says whether the payload is an event or an exception, and
//! `:event-type` / `:exception-type` names it. CRCs are not verified; the
//! transport is TLS.

use switchyard_core::StreamEvent;
use switchyard_core::error::ProviderError;

use crate::stream::FrameDecoder;

const PRELUDE_LEN: usize = 12;
const TRAILER_LEN: usize = 4;
/// AWS caps event-stream messages at 16 MiB.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Default)]
pub(crate) struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder for EventStreamDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, ProviderError>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while self.buffer.len() >= PRELUDE_LEN {
            let total = read_u32(&self.buffer, 0) as usize;
            let headers_len = read_u32(&self.buffer, 4) as usize;
            if total > MAX_FRAME_LEN {
                events.push(Err(ProviderError::StreamProtocol(format!(
                    "event-stream frame length {total} exceeds {MAX_FRAME_LEN} bytes"
                ))));
                self.buffer.clear();
                break;
            }
            if total < PRELUDE_LEN + TRAILER_LEN + headers_len {
                events.push(Err(ProviderError::StreamProtocol(format!(
                    "event-stream frame length {total} is shorter than its headers ({headers_len})"
                ))));
                self.buffer.clear();
                break;
            }
            if self.buffer.len() < total {
                break;
            }
            let frame: Vec<u8> = self.buffer.drain(..total).collect();
            let headers = &frame[PRELUDE_LEN..PRELUDE_LEN + headers_len];
            let payload = &frame[PRELUDE_LEN + headers_len..total - TRAILER_LEN];
            events.push(decode_message(headers, payload));
        }
        events
    }

    fn finish(&mut self) -> Vec<Result<StreamEvent, ProviderError>> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let leftover = self.buffer.len();
        self.buffer.clear();
        vec![Err(ProviderError::StreamProtocol(format!(
            "event stream ended inside a frame ({leftover} trailing bytes)"
        )))]
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// String-valued headers of one message; other value types are skipped.
fn parse_headers(mut buf: &[u8]) -> Result<Vec<(String, String)>, ProviderError> {
    let truncated = || ProviderError::StreamProtocol("truncated event-stream header".into());
    let mut headers = Vec::new();

    while !buf.is_empty() {
        let name_len = *buf.first().ok_or_else(truncated)? as usize;
        let name = buf.get(1..1 + name_len).ok_or_else(truncated)?;
        let name = String::from_utf8_lossy(name).to_string();
        let value_type = *buf.get(1 + name_len).ok_or_else(truncated)?;
        let rest = &buf[2 + name_len..];

        let (value, consumed) = match value_type {
            0 | 1 => (None, 0),
            2 => (None, 1),
            3 => (None, 2),
            4 => (None, 4),
            5 | 8 => (None, 8),
            9 => (None, 16),
            6 | 7 => {
                let len_bytes = rest.get(..2).ok_or_else(truncated)?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                let bytes = rest.get(2..2 + len).ok_or_else(truncated)?;
                let value = (value_type == 7).then(|| String::from_utf8_lossy(bytes).to_string());
                (value, 2 + len)
            }
            other => {
                return Err(ProviderError::StreamProtocol(format!(
                    "unknown event-stream header type {other}"
                )));
            }
        };
        if rest.len() < consumed {
            return Err(truncated());
        }
        if let Some(value) = value {
            headers.push((name, value));
        }
        buf = &rest[consumed..];
    }
    Ok(headers)
}

fn decode_message(headers: &[u8], payload: &[u8]) -> Result<StreamEvent, ProviderError> {
    let headers = parse_headers(headers)?;
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let body: serde_json::Value = if payload.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(payload).map_err(|e| {
            ProviderError::StreamProtocol(format!("unparseable event-stream payload: {e}"))
        })?
    };

    match header(":message-type").unwrap_or("event") {
        "event" => Ok(StreamEvent::new(header(":event-type").map(str::to_string), body)),
        "exception" => Err(exception_error(
            header(":exception-type").unwrap_or("unknownException"),
            body["message"].as_str().unwrap_or("stream exception"),
        )),
        _ => Err(exception_error(
            header(":error-code").unwrap_or("unknownError"),
            header(":error-message").unwrap_or("stream error"),
        )),
    }
}

fn exception_error(kind: &str, message: &str) -> ProviderError {
    let message = format!("{kind}: {message}");
    match kind {
        "throttlingException" => ProviderError::RateLimited { retry_after_secs: 5 },
        "modelTimeoutException" => ProviderError::Timeout(message),
        "serviceUnavailableException" => ProviderError::ApiError {
            status_code: 503,
            message,
        },
        "internalServerException" | "modelStreamErrorException" => ProviderError::ApiError {
            status_code: 500,
            message,
        },
        _ => ProviderError::ApiError {
            status_code: 400,
            message,
        },
    }
}

/// Encode one frame. Used by tests to build Bedrock streams.
#[cfg(test)]
pub(crate) fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }
    let total = PRELUDE_LEN + header_bytes.len() + payload.len() + TRAILER_LEN;
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_frame(event_type: &str, payload: &str) -> Vec<u8> {
        encode_frame(
            &[
                (":event-type", event_type),
                (":content-type", "application/json"),
                (":message-type", "event"),
            ],
            payload.as_bytes(),
        )
    }

    #[test]
    fn decodes_event_frames() {
        let mut bytes = event_frame("messageStart", r#"{"role":"assistant"}"#);
        bytes.extend(event_frame(
            "contentBlockDelta",
            r#"{"contentBlockIndex":0,"delta":{"text":"Hi"}}"#,
        ));

        let mut decoder = EventStreamDecoder::default();
        let events = decoder.push(&bytes);
        assert_eq!(events.len(), 2);
        let delta = events[1].as_ref().unwrap();
        assert_eq!(delta.event.as_deref(), Some("contentBlockDelta"));
        assert_eq!(delta.data["delta"]["text"], "Hi");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn frames_split_byte_by_byte() {
        let bytes = event_frame("messageStop", r#"{"stopReason":"end_turn"}"#);
        let mut decoder = EventStreamDecoder::default();
        let mut events = Vec::new();
        for b in &bytes {
            events.extend(decoder.push(std::slice::from_ref(b)));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().data["stopReason"], "end_turn");
    }

    #[test]
    fn exceptions_map_to_provider_errors() {
        let frame = encode_frame(
            &[
                (":exception-type", "throttlingException"),
                (":message-type", "exception"),
            ],
            br#"{"message":"slow down"}"#,
        );
        let events = EventStreamDecoder::default().push(&frame);
        assert!(matches!(events[0], Err(ProviderError::RateLimited { .. })));

        let frame = encode_frame(
            &[
                (":exception-type", "internalServerException"),
                (":message-type", "exception"),
            ],
            br#"{"message":"boom"}"#,
        );
        let events = EventStreamDecoder::default().push(&frame);
        assert!(matches!(
            events[0],
            Err(ProviderError::ApiError { status_code: 500, .. })
        ));
    }

    #[test]
    fn truncated_stream_is_protocol_error() {
        let bytes = event_frame("messageStop", "{}");
        let mut decoder = EventStreamDecoder::default();
        assert!(decoder.push(&bytes[..bytes.len() - 3]).is_empty());
        let tail = decoder.finish();
        assert!(matches!(tail[0], Err(ProviderError::StreamProtocol(_))));
    }

    #[test]
    fn bad_payload_is_protocol_error() {
        let frame = event_frame("contentBlockDelta", "{nope");
        let events = EventStreamDecoder::default().push(&frame);
        assert!(matches!(events[0], Err(ProviderError::StreamProtocol(_))));
    }

    #[test]
    fn oversized_frame_is_rejected_before_buffering() {
        let mut decoder = EventStreamDecoder::default();
        let mut prelude = Vec::new();
        prelude.extend_from_slice(&u32::MAX.to_be_bytes());
        prelude.extend_from_slice(&0u32.to_be_bytes());
        prelude.extend_from_slice(&0u32.to_be_bytes());

        let events = decoder.push(&prelude);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ProviderError::StreamProtocol(_))));
        assert!(decoder.buffer.is_empty());
        assert!(decoder.finish().is_empty());
    }
}
