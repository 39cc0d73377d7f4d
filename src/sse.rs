//! Wire codec for `text/event-stream` (server-sent events).
//!
//! The stream is UTF-8 text made of `field: value` lines; a blank line
//! dispatches the accumulated event:
//!
//! ```text
//! event: delivery.status.updated
//! data: {"reminder_id":"r1","status":"sent","timestamp":"..."}
//!
//! ```
//!
//! Recognized fields are `event`, `data` (repeatable, joined with `\n`),
//! `id` and `retry`. Lines starting with `:` are comments (keep-alives).
//! Frames without data are discarded, matching browser `EventSource`.

use anyhow::{bail, Result};

/// Maximum length of a single line before the stream is considered broken.
const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// A decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name (`message` if the server sent none).
    pub event: String,
    /// Payload, with multiple `data:` lines joined by `\n`.
    pub data: String,
    /// Last event id, if the server set one.
    pub id: Option<String>,
    /// Reconnection hint in milliseconds, if the server sent one.
    pub retry: Option<u64>,
}

impl SseFrame {
    /// Build a frame with the given event name and payload.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Encode this frame in wire format, terminated by a blank line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(id) = &self.id {
            out.push_str(&format!("id: {id}\n"));
        }
        if let Some(retry) = self.retry {
            out.push_str(&format!("retry: {retry}\n"));
        }
        if self.event != DEFAULT_EVENT {
            out.push_str(&format!("event: {}\n", self.event));
        }
        for line in self.data.split('\n') {
            out.push_str(&format!("data: {line}\n"));
        }
        out.push('\n');
        out
    }
}

/// Incremental event-stream decoder that handles partial reads.
///
/// Chunks may split lines and multi-byte UTF-8 sequences anywhere; bytes are
/// buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract all completed frames.
    ///
    /// # Errors
    ///
    /// Returns an error if a single line grows past the size limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseFrame>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        if self.buf.len() > MAX_LINE_SIZE {
            bail!(
                "event-stream line exceeds {} bytes without a newline",
                MAX_LINE_SIZE
            );
        }

        Ok(frames)
    }

    /// Returns true if the decoder holds an unterminated line or event.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty() || !self.data.is_empty() || self.event.is_some()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => {
                // Ids containing NUL are ignored per the event-stream rules.
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            other => log::trace!("[Sse] Ignoring unknown field {:?}", other),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let retry = self.retry.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.id.clone(),
            retry,
        })
    }
}
