//! Combine instance settings with per-call provider options.

use indexmap::IndexMap;

use crate::types::mcp_config::{HttpMcpServer, McpServerCommon, McpServerConfig, StdioMcpServer};
use crate::types::settings::{CodexCliSettings, ProviderOptions};

/// Produce the effective settings for one call. Neither input is modified.
///
/// - scalars: the override wins when present
/// - `config_overrides`: shallow union, override keys replace base keys
/// - `add_dirs`: base entries followed by override entries
/// - `mcp_servers`: per-server merge, see [`merge_mcp_server`]
pub fn merge_settings(
    base: &CodexCliSettings,
    overrides: Option<&ProviderOptions>,
) -> CodexCliSettings {
    let Some(o) = overrides else {
        return base.clone();
    };

    CodexCliSettings {
        codex_path: pick(&o.codex_path, &base.codex_path),
        allow_npx: pick(&o.allow_npx, &base.allow_npx),
        cwd: pick(&o.cwd, &base.cwd),
        env: pick(&o.env, &base.env),
        approval_mode: pick(&o.approval_mode, &base.approval_mode),
        sandbox_mode: pick(&o.sandbox_mode, &base.sandbox_mode),
        full_auto: pick(&o.full_auto, &base.full_auto),
        dangerously_bypass_approvals_and_sandbox: pick(
            &o.dangerously_bypass_approvals_and_sandbox,
            &base.dangerously_bypass_approvals_and_sandbox,
        ),
        skip_git_repo_check: pick(&o.skip_git_repo_check, &base.skip_git_repo_check),
        color: pick(&o.color, &base.color),
        output_last_message_file: pick(&o.output_last_message_file, &base.output_last_message_file),
        reasoning_effort: pick(&o.reasoning_effort, &base.reasoning_effort),
        reasoning_summary: pick(&o.reasoning_summary, &base.reasoning_summary),
        reasoning_summary_format: pick(&o.reasoning_summary_format, &base.reasoning_summary_format),
        model_verbosity: pick(&o.model_verbosity, &base.model_verbosity),
        profile: pick(&o.profile, &base.profile),
        oss: pick(&o.oss, &base.oss),
        web_search: pick(&o.web_search, &base.web_search),
        rmcp_client: pick(&o.rmcp_client, &base.rmcp_client),
        mcp_servers: merge_mcp_servers(base.mcp_servers.as_ref(), o.mcp_servers.as_ref()),
        add_dirs: concat(base.add_dirs.as_ref(), o.add_dirs.as_ref()),
        config_overrides: union(base.config_overrides.as_ref(), o.config_overrides.as_ref()),
    }
}

fn pick<T: Clone>(preferred: &Option<T>, fallback: &Option<T>) -> Option<T> {
    preferred.clone().or_else(|| fallback.clone())
}

fn concat(base: Option<&Vec<String>>, extra: Option<&Vec<String>>) -> Option<Vec<String>> {
    match (base, extra) {
        (None, None) => None,
        (base, extra) => Some(
            base.into_iter()
                .chain(extra)
                .flatten()
                .cloned()
                .collect(),
        ),
    }
}

fn union<V: Clone>(
    base: Option<&IndexMap<String, V>>,
    extra: Option<&IndexMap<String, V>>,
) -> Option<IndexMap<String, V>> {
    match (base, extra) {
        (None, None) => None,
        (base, extra) => {
            let mut merged = base.cloned().unwrap_or_default();
            if let Some(extra) = extra {
                for (key, value) in extra {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(merged)
        }
    }
}

fn merge_mcp_servers(
    base: Option<&IndexMap<String, McpServerConfig>>,
    extra: Option<&IndexMap<String, McpServerConfig>>,
) -> Option<IndexMap<String, McpServerConfig>> {
    let Some(extra) = extra else {
        return base.cloned();
    };

    let mut merged = base.cloned().unwrap_or_default();
    for (name, incoming) in extra {
        let server = merge_mcp_server(merged.get(name), incoming);
        merged.insert(name.clone(), server);
    }
    Some(merged)
}

/// Merge one server definition.
///
/// A transport switch replaces the server outright. Within the same transport,
/// fields are overridden individually, and an explicitly empty map clears the
/// inherited one. The HTTP auth pair merges as a unit: if the override sets
/// either field, neither base field survives.
pub fn merge_mcp_server(
    existing: Option<&McpServerConfig>,
    incoming: &McpServerConfig,
) -> McpServerConfig {
    match (existing, incoming) {
        (Some(McpServerConfig::Stdio(base)), McpServerConfig::Stdio(over)) => {
            McpServerConfig::Stdio(StdioMcpServer {
                command: over.command.clone(),
                args: pick(&over.args, &base.args),
                env: merge_string_map(base.env.as_ref(), over.env.as_ref()),
                cwd: pick(&over.cwd, &base.cwd),
                common: merge_common(&base.common, &over.common),
            })
        }
        (Some(McpServerConfig::Http(base)), McpServerConfig::Http(over)) => {
            let override_auth = over.bearer_token.is_some() || over.bearer_token_env_var.is_some();
            let (bearer_token, bearer_token_env_var) = if override_auth {
                (over.bearer_token.clone(), over.bearer_token_env_var.clone())
            } else {
                (base.bearer_token.clone(), base.bearer_token_env_var.clone())
            };

            McpServerConfig::Http(HttpMcpServer {
                url: over.url.clone(),
                bearer_token,
                bearer_token_env_var,
                http_headers: merge_string_map(base.http_headers.as_ref(), over.http_headers.as_ref()),
                env_http_headers: merge_string_map(
                    base.env_http_headers.as_ref(),
                    over.env_http_headers.as_ref(),
                ),
                common: merge_common(&base.common, &over.common),
            })
        }
        _ => incoming.clone(),
    }
}

fn merge_common(base: &McpServerCommon, over: &McpServerCommon) -> McpServerCommon {
    McpServerCommon {
        enabled: pick(&over.enabled, &base.enabled),
        startup_timeout_sec: pick(&over.startup_timeout_sec, &base.startup_timeout_sec),
        tool_timeout_sec: pick(&over.tool_timeout_sec, &base.tool_timeout_sec),
        enabled_tools: pick(&over.enabled_tools, &base.enabled_tools),
        disabled_tools: pick(&over.disabled_tools, &base.disabled_tools),
    }
}

fn merge_string_map(
    base: Option<&IndexMap<String, String>>,
    over: Option<&IndexMap<String, String>>,
) -> Option<IndexMap<String, String>> {
    match over {
        Some(over) if over.is_empty() => Some(IndexMap::new()),
        Some(_) => union(base, over),
        None => base.cloned(),
    }
}
