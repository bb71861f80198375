pub mod abort;
pub mod content;
pub mod events;
pub mod generation;
pub mod mcp_config;
pub mod settings;

// Re-exports for convenience.
pub use abort::AbortSignal;
pub use content::{ContentBlock, StreamPart, ToolCall, ToolResult};
pub use events::{
    CommandExecution, FileChange, FileUpdateChange, ItemDetails, McpToolCall, ProtocolEvent,
    ReportedUsage, ThreadItem, WebSearch,
};
pub use generation::{
    FinishCategory, FinishReason, GenerateRequest, GenerationResult, ImageInput,
    ProviderMetadata, ResponseFormat, ResponseMetadata, SamplingOptions, TokenUsage, Warning,
};
pub use mcp_config::{HttpMcpServer, McpServerCommon, McpServerConfig, StdioMcpServer};
pub use settings::{
    ApprovalMode, CodexCliSettings, ColorMode, ModelVerbosity, ProviderOptions, ReasoningEffort,
    ReasoningSummary, ReasoningSummaryFormat, SandboxMode,
};
