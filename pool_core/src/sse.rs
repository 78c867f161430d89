//! Incremental decoder for the `queue/data` event stream.

use serde_json::Value;
use tracing::debug;

use crate::error::AttemptError;

/// `msg` tag of the event that ends a job.
pub const PROCESS_COMPLETED: &str = "process_completed";

/// Longest unterminated line the decoder will buffer.
pub const MAX_PENDING_LINE: usize = 1024 * 1024;

/// One decoded `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub raw: Value,
}

impl StreamEvent {
    pub fn msg(&self) -> Option<&str> {
        self.raw.get("msg").and_then(Value::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.msg() == Some(PROCESS_COMPLETED)
    }

    /// Only an explicit `false` counts as failure.
    pub fn succeeded(&self) -> bool {
        self.raw.get("success").and_then(Value::as_bool).unwrap_or(true)
    }

    /// `output.data`, or empty when missing or not a list.
    pub fn output_data(&self) -> &[Value] {
        self.raw
            .pointer("/output/data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Splits chunks on newlines, carrying partial lines over to the next chunk.
/// Bytes are buffered undecoded so multi-byte characters may straddle chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every complete event it finished.
    /// Fails once a single line outgrows [`MAX_PENDING_LINE`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, AttemptError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        if self.buffer.len() > MAX_PENDING_LINE {
            return Err(AttemptError::Stream(format!(
                "event line exceeds {MAX_PENDING_LINE} bytes without a newline"
            )));
        }
        Ok(events)
    }

    /// Bytes of an unterminated trailing line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<StreamEvent> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(raw) => Some(StreamEvent { raw }),
        Err(e) => {
            debug!("Ignoring undecodable event line: {e}");
            None
        }
    }
}
