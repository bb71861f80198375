//! Language-model provider backed by the locally installed Codex CLI.
//!
//! Each call runs `codex exec --experimental-json`, writes the prompt to its
//! stdin and turns the JSONL event stream into a [`GenerationResult`] or a
//! stream of [`StreamPart`]s.

pub mod assembler;
pub mod cleanup;
pub mod command;
pub mod error;
pub mod event_parser;
pub mod language_model;
pub mod provider;
pub mod settings_merge;
pub mod tool_tracker;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic use.
pub use error::{Error, Result};
pub use types::{
    AbortSignal, ApprovalMode, CodexCliSettings, ContentBlock, FinishCategory, FinishReason,
    GenerateRequest, GenerationResult, ImageInput, McpServerConfig, ProtocolEvent,
    ProviderOptions, ResponseFormat, SandboxMode, StreamPart, TokenUsage, ToolCall, ToolResult,
    Warning,
};

// Re-export primary APIs.
pub use cleanup::{ImageWriter, TempImageWriter};
pub use language_model::CodexLanguageModel;
pub use provider::CodexCliProvider;
pub use settings_merge::merge_settings;
