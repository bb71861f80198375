use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One decoded line of `codex exec --experimental-json` output.
///
/// Decoded by [`crate::event_parser::parse_event`]; unknown `type`s are preserved.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProtocolEvent {
    ThreadStarted {
        thread_id: Option<String>,
    },

    /// Older CLI builds announce the session this way.
    SessionCreated {
        session_id: Option<String>,
    },

    TurnStarted,

    TurnCompleted {
        usage: Option<ReportedUsage>,
        finish_reason: Option<String>,
    },

    TurnFailed {
        message: Option<String>,
    },

    ItemStarted {
        item: ThreadItem,
    },

    ItemUpdated {
        item: ThreadItem,
    },

    ItemCompleted {
        item: ThreadItem,
    },

    /// Unrecoverable error reported on the event stream.
    Error {
        message: Option<String>,
    },

    Unknown {
        event_type: String,
        raw: Value,
    },
}

/// Token counts as reported on `turn.completed`. Missing or `null` counts are zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportedUsage {
    #[serde(deserialize_with = "null_as_zero")]
    pub input_tokens: u64,
    #[serde(deserialize_with = "null_as_zero")]
    pub cached_input_tokens: u64,
    #[serde(deserialize_with = "null_as_zero")]
    pub output_tokens: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

/// An identified unit of agent work.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadItem {
    pub id: Option<String>,
    pub details: ItemDetails,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ItemDetails {
    AgentMessage { text: Option<String> },
    Reasoning { text: Option<String> },
    CommandExecution(CommandExecution),
    FileChange(FileChange),
    McpToolCall(McpToolCall),
    WebSearch(WebSearch),
    Other { item_type: String, raw: Value },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandExecution {
    pub command: Option<String>,
    pub aggregated_output: Option<String>,
    pub exit_code: Option<i32>,
    pub status: Option<String>,
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileChange {
    pub changes: Vec<FileUpdateChange>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileUpdateChange {
    pub path: String,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpToolCall {
    pub server: Option<String>,
    pub tool: Option<String>,
    pub arguments: Option<Value>,
    pub result: Option<Value>,
    /// Either `{ "message": ... }` or a bare string depending on CLI version.
    pub error: Option<Value>,
    pub status: Option<String>,
}

impl McpToolCall {
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(
                other
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearch {
    pub query: Option<String>,
    pub status: Option<String>,
}

impl ProtocolEvent {
    /// The work item carried by `item.*` events.
    pub fn item(&self) -> Option<&ThreadItem> {
        match self {
            Self::ItemStarted { item } | Self::ItemUpdated { item } | Self::ItemCompleted { item } => {
                Some(item)
            }
            _ => None,
        }
    }

    /// Session identifier carried by a session-start event.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted { thread_id } => thread_id.as_deref(),
            Self::SessionCreated { session_id } => session_id.as_deref(),
            _ => None,
        }
    }
}

impl ItemDetails {
    pub fn is_agent_message(&self) -> bool {
        matches!(self, Self::AgentMessage { .. })
    }
}
