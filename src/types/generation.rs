use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::abort::AbortSignal;
use super::content::ContentBlock;
use super::events::ReportedUsage;
use super::settings::ProviderOptions;

/// An image attached to the prompt, already decoded to raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    pub fn new(data: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// Structured output. Codex enforces `schema` when one is given.
    Json { schema: Option<Value> },
}

/// Sampling parameters that a generic caller may set. Codex honours none of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
}

/// A single generate or stream call.
///
/// `prompt` and `images` are the already-flattened conversation; `warnings`
/// carries whatever the message mapper reported while flattening it.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub images: Vec<ImageInput>,
    pub warnings: Vec<Warning>,
    pub response_format: Option<ResponseFormat>,
    pub provider_options: Option<ProviderOptions>,
    pub abort_signal: Option<AbortSignal>,
    pub sampling: SamplingOptions,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub(crate) fn output_schema(&self) -> Option<&Value> {
        match self.response_format {
            Some(ResponseFormat::Json { schema: Some(ref schema) }) => Some(schema),
            _ => None,
        }
    }

    /// First 200 characters of the prompt, attached to process errors.
    pub(crate) fn prompt_excerpt(&self) -> String {
        self.prompt.chars().take(200).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Warning {
    UnsupportedSetting {
        setting: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    Other {
        message: String,
    },
}

impl Warning {
    pub fn unsupported(setting: impl Into<String>) -> Self {
        Self::UnsupportedSetting {
            setting: setting.into(),
            details: None,
        }
    }
}

/// Token accounting for one call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Part of `input_tokens` served from the prompt cache.
    pub cache_read_tokens: u64,
    /// Part of `input_tokens` not served from the prompt cache.
    pub no_cache_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl From<&ReportedUsage> for TokenUsage {
    fn from(reported: &ReportedUsage) -> Self {
        Self {
            input_tokens: reported.input_tokens,
            output_tokens: reported.output_tokens,
            cache_read_tokens: reported.cached_input_tokens,
            no_cache_tokens: reported
                .input_tokens
                .saturating_sub(reported.cached_input_tokens),
            raw: serde_json::to_value(reported).ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FinishCategory {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
}

/// Normalized finish reason plus whatever the process reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinishReason {
    pub unified: FinishCategory,
    #[serde(default)]
    pub raw: Option<String>,
}

impl FinishReason {
    pub fn from_raw(raw: Option<&str>) -> Self {
        let unified = match raw {
            None | Some("") | Some("stop") | Some("end_turn") | Some("completed") => {
                FinishCategory::Stop
            }
            Some("length") | Some("max_tokens") | Some("max_output_tokens") => {
                FinishCategory::Length
            }
            Some("content_filter") | Some("content-filter") => FinishCategory::ContentFilter,
            Some("tool_calls") | Some("tool-calls") | Some("tool_use") => FinishCategory::ToolCalls,
            Some("error") => FinishCategory::Error,
            Some(_) => FinishCategory::Other,
        };
        Self {
            unified,
            raw: raw.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub id: String,
    pub timestamp: SystemTime,
    pub model_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// The assembled output of a `generate` call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: Vec<ContentBlock>,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    pub warnings: Vec<Warning>,
    pub response: ResponseMetadata,
    pub provider_metadata: ProviderMetadata,
}

impl GenerationResult {
    /// All text content joined together.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.provider_metadata.session_id.as_deref()
    }
}
