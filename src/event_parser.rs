use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::events::{ItemDetails, ProtocolEvent, ThreadItem};

/// Incremental decoder for the newline-delimited JSON event stream.
///
/// Feed raw stdout bytes with [`push`](Self::push); every complete line is
/// decoded exactly once. Lines that fail to decode are dropped.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to contain no newline.
    scanned: usize,
}

impl EventStreamParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the events for every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.scanned = 0;
            if let Some(event) = decode_line(&line[..end]) {
                events.push(event);
            }
        }

        self.scanned = self.buffer.len();
        events
    }

    /// Decode whatever is left once the stream has ended without a final newline.
    pub fn finish(&mut self) -> Option<ProtocolEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        decode_line(&rest)
    }

    /// Decode an entire buffered output in one go.
    pub(crate) fn parse_all(output: &[u8]) -> Vec<ProtocolEvent> {
        let mut parser = Self::new();
        let mut events = parser.push(output);
        events.extend(parser.finish());
        events
    }
}

fn decode_line(raw: &[u8]) -> Option<ProtocolEvent> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }

    let decoded = serde_json::from_str::<Value>(line)
        .map_err(Error::from)
        .and_then(parse_event);

    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(line = %line, "dropping unparseable codex event: {e}");
            None
        }
    }
}

/// Parse a raw JSON value from the CLI stream into a typed event.
///
/// The CLI emits one object per line with a top-level `type` field:
/// - `thread.started` / `session.created`: session identifiers
/// - `turn.*`: turn lifecycle, usage on `turn.completed`
/// - `item.*`: a nested `"item"` object describing one unit of work
/// - `error`: a fatal stream error
/// - Others: preserved as Unknown
pub fn parse_event(raw: Value) -> Result<ProtocolEvent> {
    let event_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error("missing 'type' field"))?;

    let event = match event_type {
        "thread.started" => ProtocolEvent::ThreadStarted {
            thread_id: string_field(&raw, "thread_id"),
        },
        "session.created" => ProtocolEvent::SessionCreated {
            session_id: string_field(&raw, "session_id"),
        },
        "turn.started" => ProtocolEvent::TurnStarted,
        "turn.completed" => ProtocolEvent::TurnCompleted {
            usage: match raw.get("usage") {
                Some(usage) if !usage.is_null() => Some(decode(usage.clone(), "usage")?),
                _ => None,
            },
            finish_reason: string_field(&raw, "finish_reason")
                .or_else(|| string_field(&raw, "stop_reason")),
        },
        "turn.failed" => ProtocolEvent::TurnFailed {
            message: raw
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| string_field(&raw, "message")),
        },
        "item.started" => ProtocolEvent::ItemStarted {
            item: parse_item(&raw)?,
        },
        "item.updated" => ProtocolEvent::ItemUpdated {
            item: parse_item(&raw)?,
        },
        "item.completed" => ProtocolEvent::ItemCompleted {
            item: parse_item(&raw)?,
        },
        "error" => ProtocolEvent::Error {
            message: string_field(&raw, "message"),
        },
        other => ProtocolEvent::Unknown {
            event_type: other.to_string(),
            raw: raw.clone(),
        },
    };

    Ok(event)
}

fn parse_item(raw: &Value) -> Result<ThreadItem> {
    let item = raw
        .get("item")
        .filter(|v| v.is_object())
        .ok_or_else(|| parse_error("item event without an 'item' object"))?;

    // Early protocol builds used `item_type`.
    let item_type = item
        .get("type")
        .or_else(|| item.get("item_type"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let details = match item_type {
        "agent_message" | "assistant_message" => ItemDetails::AgentMessage {
            text: string_field(item, "text"),
        },
        "reasoning" => ItemDetails::Reasoning {
            text: string_field(item, "text"),
        },
        "command_execution" => ItemDetails::CommandExecution(decode(item.clone(), item_type)?),
        "file_change" => ItemDetails::FileChange(decode(item.clone(), item_type)?),
        "mcp_tool_call" => ItemDetails::McpToolCall(decode(item.clone(), item_type)?),
        "web_search" => ItemDetails::WebSearch(decode(item.clone(), item_type)?),
        other => ItemDetails::Other {
            item_type: other.to_string(),
            raw: item.clone(),
        },
    };

    Ok(ThreadItem {
        id: string_field(item, "id"),
        details,
    })
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| parse_error(format!("{what} parse failed: {e}")))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_error(reason: impl Into<String>) -> Error {
    Error::EventParse {
        reason: reason.into(),
    }
}
