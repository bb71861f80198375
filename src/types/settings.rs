use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mcp_config::McpServerConfig;
use crate::error::{Error, Result};

/// Approval policy passed to Codex as `approval_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    Untrusted,
    OnFailure,
    OnRequest,
    Never,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::OnFailure => "on-failure",
            Self::OnRequest => "on-request",
            Self::Never => "never",
        }
    }
}

/// Sandbox policy passed to Codex as `sandbox_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Xhigh => "xhigh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    Auto,
    Concise,
    Detailed,
    None,
}

impl ReasoningSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Concise => "concise",
            Self::Detailed => "detailed",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummaryFormat {
    None,
    Experimental,
}

impl ReasoningSummaryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Experimental => "experimental",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVerbosity {
    Low,
    Medium,
    High,
}

impl ModelVerbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Always,
    Never,
    Auto,
}

impl ColorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Auto => "auto",
        }
    }
}

/// Configuration for a Codex-backed language model.
///
/// Every field is optional so the same shape doubles as per-call
/// [`ProviderOptions`]. Use `..Default::default()` for fields you don't need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodexCliSettings {
    // --- Invocation ---
    /// Explicit path to the `codex` binary or to its `.js` entrypoint.
    pub codex_path: Option<PathBuf>,

    /// Allow falling back to `npx -y @openai/codex` when nothing else resolves.
    pub allow_npx: Option<bool>,

    /// Working directory for the CLI process.
    pub cwd: Option<PathBuf>,

    /// Additional environment variables for the CLI process.
    pub env: Option<IndexMap<String, String>>,

    // --- Execution mode ---
    pub approval_mode: Option<ApprovalMode>,
    pub sandbox_mode: Option<SandboxMode>,
    pub full_auto: Option<bool>,
    pub dangerously_bypass_approvals_and_sandbox: Option<bool>,

    /// Pass `--skip-git-repo-check`. Defaults to true.
    pub skip_git_repo_check: Option<bool>,

    // --- Output ---
    pub color: Option<ColorMode>,

    /// Where Codex writes its final message. A temp file is used when unset.
    pub output_last_message_file: Option<PathBuf>,

    // --- Reasoning ---
    pub reasoning_effort: Option<ReasoningEffort>,
    pub reasoning_summary: Option<ReasoningSummary>,
    pub reasoning_summary_format: Option<ReasoningSummaryFormat>,
    #[serde(alias = "textVerbosity")]
    pub model_verbosity: Option<ModelVerbosity>,

    // --- Features ---
    pub profile: Option<String>,
    pub oss: Option<bool>,
    pub web_search: Option<bool>,
    pub rmcp_client: Option<bool>,

    // --- MCP ---
    pub mcp_servers: Option<IndexMap<String, McpServerConfig>>,

    // --- Extra config ---
    /// Extra writable directories, one `--add-dir` each.
    pub add_dirs: Option<Vec<String>>,

    /// Arbitrary `-c key=value` overrides. Nested maps flatten to dotted keys.
    pub config_overrides: Option<IndexMap<String, Value>>,
}

/// Per-call overrides. Same shape as the instance settings, merged on top for one call.
pub type ProviderOptions = CodexCliSettings;

impl CodexCliSettings {
    /// Parse settings (or provider options) from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Check combinations that Codex would reject or silently misinterpret.
    pub fn validate(&self) -> Result<()> {
        if self.full_auto == Some(true) && self.dangerously_bypass_approvals_and_sandbox == Some(true)
        {
            return Err(Error::InvalidSettings(
                "fullAuto and dangerouslyBypassApprovalsAndSandbox are mutually exclusive".into(),
            ));
        }

        if let Some(ref servers) = self.mcp_servers {
            for (name, server) in servers {
                server.validate(name)?;
            }
        }

        Ok(())
    }
}
