use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Configuration for an MCP server that Codex should launch or connect to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Stdio-based MCP server (subprocess spawned by Codex).
    Stdio(StdioMcpServer),

    /// Streamable HTTP MCP server.
    Http(HttpMcpServer),
}

/// Fields shared by both transports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerCommon {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StdioMcpServer {
    pub command: String,
    /// `Some(vec![])` clears an inherited argument list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// `Some(empty)` clears an inherited environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(flatten)]
    pub common: McpServerCommon,
}

/// HTTP server. `bearer_token` and `bearer_token_env_var` are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMcpServer {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token_env_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_http_headers: Option<IndexMap<String, String>>,
    #[serde(flatten)]
    pub common: McpServerCommon,
}

impl McpServerConfig {
    /// Convenience constructor for a stdio server with no extra fields.
    pub fn stdio(command: impl Into<String>) -> Self {
        Self::Stdio(StdioMcpServer {
            command: command.into(),
            ..Default::default()
        })
    }

    /// Convenience constructor for an HTTP server with no extra fields.
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http(HttpMcpServer {
            url: url.into(),
            ..Default::default()
        })
    }

    pub fn transport(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::Http(_) => "http",
        }
    }

    pub fn common(&self) -> &McpServerCommon {
        match self {
            Self::Stdio(server) => &server.common,
            Self::Http(server) => &server.common,
        }
    }

    pub(crate) fn validate(&self, name: &str) -> Result<()> {
        match self {
            Self::Stdio(server) if server.command.trim().is_empty() => Err(Error::InvalidSettings(
                format!("mcp server '{name}': stdio command must not be empty"),
            )),
            Self::Http(server) if server.url.trim().is_empty() => Err(Error::InvalidSettings(
                format!("mcp server '{name}': http url must not be empty"),
            )),
            Self::Http(server)
                if server.bearer_token.is_some() && server.bearer_token_env_var.is_some() =>
            {
                Err(Error::InvalidSettings(format!(
                    "mcp server '{name}': bearerToken and bearerTokenEnvVar are mutually exclusive"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Leaf fields in the order Codex receives them as `mcp_servers.<name>.<field>`.
    ///
    /// Map-valued fields are returned as JSON objects and flattened by the caller,
    /// so an explicitly empty map still produces `<field>={}`.
    pub(crate) fn config_fields(&self) -> Vec<(&'static str, Value)> {
        let common = self.common();
        let mut fields = Vec::new();

        if let Some(enabled) = common.enabled {
            fields.push(("enabled", Value::Bool(enabled)));
        }
        if let Some(secs) = common.startup_timeout_sec {
            fields.push(("startup_timeout_sec", Value::from(secs)));
        }
        if let Some(secs) = common.tool_timeout_sec {
            fields.push(("tool_timeout_sec", Value::from(secs)));
        }
        if let Some(ref tools) = common.enabled_tools {
            fields.push(("enabled_tools", string_array(tools)));
        }
        if let Some(ref tools) = common.disabled_tools {
            fields.push(("disabled_tools", string_array(tools)));
        }

        match self {
            Self::Stdio(server) => {
                fields.push(("command", Value::String(server.command.clone())));
                if let Some(ref args) = server.args {
                    fields.push(("args", string_array(args)));
                }
                if let Some(ref env) = server.env {
                    fields.push(("env", string_map(env)));
                }
                if let Some(ref cwd) = server.cwd {
                    fields.push(("cwd", Value::String(cwd.clone())));
                }
            }
            Self::Http(server) => {
                fields.push(("url", Value::String(server.url.clone())));
                if let Some(ref token) = server.bearer_token {
                    fields.push(("bearer_token", Value::String(token.clone())));
                }
                if let Some(ref var) = server.bearer_token_env_var {
                    fields.push(("bearer_token_env_var", Value::String(var.clone())));
                }
                if let Some(ref headers) = server.http_headers {
                    fields.push(("http_headers", string_map(headers)));
                }
                if let Some(ref headers) = server.env_http_headers {
                    fields.push(("env_http_headers", string_map(headers)));
                }
            }
        }

        fields
    }
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn string_map(map: &IndexMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
