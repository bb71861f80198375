use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::generation::{FinishReason, ProviderMetadata, ResponseMetadata, TokenUsage, Warning};

/// A block of content in a generation result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ContentBlock {
    Text { text: String },
}

impl ContentBlock {
    /// Extract text content if this is a Text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
        }
    }
}

/// A tool invocation executed by Codex itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    /// Always true: Codex runs its own tools.
    pub provider_executed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// One element of a streamed response, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StreamPart {
    StreamStart {
        warnings: Vec<Warning>,
    },
    ResponseMetadata(ResponseMetadata),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Finish {
        finish_reason: FinishReason,
        usage: TokenUsage,
        provider_metadata: ProviderMetadata,
    },
}

impl StreamPart {
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            StreamPart::TextDelta { delta, .. } => Some(delta),
            _ => None,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, StreamPart::Finish { .. })
    }
}
