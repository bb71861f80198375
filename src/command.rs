//! Build the `codex exec` invocation for one call.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::cleanup::{ImageWriter, TempArtifacts};
use crate::error::Result;
use crate::transport::cli_discovery::resolve_base_invocation;
use crate::types::generation::ImageInput;
use crate::types::settings::{ApprovalMode, CodexCliSettings, SandboxMode};

/// Marker telling Codex to read the prompt from stdin.
pub const STDIN_MARKER: &str = "-";

/// Terminates option parsing so a variadic `--image` cannot eat the stdin marker.
pub const END_OF_FLAGS: &str = "--";

const DEFAULT_APPROVAL: ApprovalMode = ApprovalMode::OnFailure;
const DEFAULT_SANDBOX: SandboxMode = SandboxMode::WorkspaceWrite;

const UNSUPPORTED_SCHEMA_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$defs",
    "definitions",
    "title",
    "examples",
    "default",
    "format",
    "pattern",
];

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables set on top of the inherited parent environment.
    pub env: IndexMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// The invocation plus every temp artifact created for it.
///
/// Temp files live exactly as long as this value.
#[derive(Debug)]
pub struct ComposedCommand {
    pub invocation: Invocation,
    pub schema_path: Option<PathBuf>,
    pub last_message_path: PathBuf,
    /// True when `last_message_path` was auto-created and is deleted with the artifacts.
    pub last_message_is_temp: bool,
    pub artifacts: TempArtifacts,
}

impl ComposedCommand {
    pub(crate) fn image_paths(&self) -> &[PathBuf] {
        self.artifacts.image_paths()
    }
}

/// Compose the command line, environment and temp files for one call.
///
/// The prompt is deliberately absent: it is written to the child's stdin and
/// the last positional argument is [`STDIN_MARKER`].
pub fn compose(
    model_id: &str,
    settings: &CodexCliSettings,
    images: &[ImageInput],
    output_schema: Option<&Value>,
    image_writer: Arc<dyn ImageWriter>,
) -> Result<ComposedCommand> {
    settings.validate()?;

    let base = resolve_base_invocation(
        settings.codex_path.as_deref(),
        settings.allow_npx.unwrap_or(false),
        settings.cwd.as_deref(),
    )?;

    let mut args = base.args;
    args.push("exec".into());
    args.push("--experimental-json".into());

    if settings.full_auto == Some(true) {
        args.push("--full-auto".into());
    } else if settings.dangerously_bypass_approvals_and_sandbox == Some(true) {
        args.push("--dangerously-bypass-approvals-and-sandbox".into());
    } else {
        let approval = settings.approval_mode.unwrap_or(DEFAULT_APPROVAL);
        push_override(&mut args, "approval_policy", approval.as_str());
        let sandbox = settings.sandbox_mode.unwrap_or(DEFAULT_SANDBOX);
        push_override(&mut args, "sandbox_mode", sandbox.as_str());
    }

    if settings.skip_git_repo_check != Some(false) {
        args.push("--skip-git-repo-check".into());
    }

    if let Some(effort) = settings.reasoning_effort {
        push_override(&mut args, "model_reasoning_effort", effort.as_str());
    }
    if let Some(summary) = settings.reasoning_summary {
        push_override(&mut args, "model_reasoning_summary", summary.as_str());
    }
    if let Some(format) = settings.reasoning_summary_format {
        push_override(&mut args, "model_reasoning_summary_format", format.as_str());
    }
    if let Some(verbosity) = settings.model_verbosity {
        push_override(&mut args, "model_verbosity", verbosity.as_str());
    }

    if let Some(ref profile) = settings.profile {
        args.push("--profile".into());
        args.push(profile.clone());
    }
    if settings.oss == Some(true) {
        args.push("--oss".into());
    }
    if let Some(web_search) = settings.web_search {
        push_override(&mut args, "tools.web_search", &web_search.to_string());
    }

    push_mcp_overrides(&mut args, settings);

    if let Some(color) = settings.color {
        args.push("--color".into());
        args.push(color.as_str().into());
    }
    if !model_id.is_empty() {
        args.push("-m".into());
        args.push(model_id.into());
    }
    for dir in settings.add_dirs.iter().flatten() {
        args.push("--add-dir".into());
        args.push(dir.clone());
    }

    if let Some(ref overrides) = settings.config_overrides {
        for (key, value) in overrides {
            push_config_override(&mut args, key, value);
        }
    }

    // Everything below writes temp files; the guard owns them from here on.
    let mut artifacts = TempArtifacts::new(image_writer);

    let schema_path = match output_schema.and_then(prepare_output_schema) {
        Some(schema) => {
            let dir = artifacts.create_dir("codex-schema-")?;
            let path = dir.join("schema.json");
            std::fs::write(&path, serde_json::to_string_pretty(&schema)?)?;
            args.push("--output-schema".into());
            args.push(path.to_string_lossy().into_owned());
            Some(path)
        }
        None => None,
    };

    for image in images {
        let path = artifacts.write_image(image)?;
        args.push("--image".into());
        args.push(path.to_string_lossy().into_owned());
    }

    let (last_message_path, last_message_is_temp) = match settings.output_last_message_file {
        Some(ref path) => (path.clone(), false),
        None => (artifacts.create_dir("codex-cli-")?.join("last-message.txt"), true),
    };
    args.push("--output-last-message".into());
    args.push(last_message_path.to_string_lossy().into_owned());

    if !images.is_empty() {
        args.push(END_OF_FLAGS.into());
    }
    args.push(STDIN_MARKER.into());

    Ok(ComposedCommand {
        invocation: Invocation {
            program: base.program,
            args,
            env: child_env(settings),
            cwd: settings.cwd.clone(),
        },
        schema_path,
        last_message_path,
        last_message_is_temp,
        artifacts,
    })
}

fn child_env(settings: &CodexCliSettings) -> IndexMap<String, String> {
    let mut env = settings.env.clone().unwrap_or_default();
    if !env.contains_key("RUST_LOG") && std::env::var_os("RUST_LOG").is_none() {
        env.insert("RUST_LOG".into(), "error".into());
    }
    env
}

fn push_override(args: &mut Vec<String>, key: &str, value: &str) {
    args.push("-c".into());
    args.push(format!("{key}={value}"));
}

fn push_mcp_overrides(args: &mut Vec<String>, settings: &CodexCliSettings) {
    if settings.rmcp_client == Some(true) {
        push_override(args, "features.rmcp_client", "true");
    }

    let Some(ref servers) = settings.mcp_servers else {
        return;
    };

    for (raw_name, server) in servers {
        let name = raw_name.trim();
        if name.is_empty() {
            continue;
        }
        for (field, value) in server.config_fields() {
            push_config_override(args, &format!("mcp_servers.{name}.{field}"), &value);
        }
    }
}

/// Emit `-c key=value` pairs for an arbitrary JSON value.
///
/// Maps recurse into dotted keys; an empty map is emitted as `{}` and an
/// empty array as `[]` so callers can clear inherited values.
pub fn push_config_override(args: &mut Vec<String>, key: &str, value: &Value) {
    match value {
        Value::Object(map) if map.is_empty() => push_override(args, key, "{}"),
        Value::Object(map) => {
            for (child, child_value) in map {
                push_config_override(args, &format!("{key}.{child}"), child_value);
            }
        }
        other => push_override(args, key, &config_value_text(other)),
    }
}

fn config_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".into(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Strip keywords Codex's strict structured output rejects.
///
/// Property names under `properties` are kept verbatim even when they collide
/// with a stripped keyword.
pub fn sanitize_json_schema(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json_schema).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                if key == "properties" {
                    if let Value::Object(props) = child {
                        let props = props
                            .iter()
                            .map(|(name, schema)| (name.clone(), sanitize_json_schema(schema)))
                            .collect();
                        out.insert(key.clone(), Value::Object(props));
                        continue;
                    }
                }
                if UNSUPPORTED_SCHEMA_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key.clone(), sanitize_json_schema(child));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Sanitized schema with `additionalProperties: false`, or None if nothing to enforce.
pub fn prepare_output_schema(schema: &Value) -> Option<Value> {
    match schema {
        Value::Object(map) if !map.is_empty() => {
            let mut sanitized = sanitize_json_schema(schema);
            if let Value::Object(ref mut out) = sanitized {
                out.insert("additionalProperties".into(), Value::Bool(false));
            }
            Some(sanitized)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::TempImageWriter;
    use crate::types::mcp_config::{
        HttpMcpServer, McpServerCommon, McpServerConfig, StdioMcpServer,
    };
    use crate::types::settings::{ColorMode, ReasoningEffort};
    use serde_json::json;

    fn settings() -> CodexCliSettings {
        CodexCliSettings {
            codex_path: Some(PathBuf::from("/usr/local/bin/codex")),
            ..Default::default()
        }
    }

    fn compose_with(
        settings: &CodexCliSettings,
        images: &[ImageInput],
        schema: Option<&Value>,
    ) -> ComposedCommand {
        compose("gpt-5", settings, images, schema, Arc::new(TempImageWriter)).unwrap()
    }

    fn pair_position(args: &[String], flag: &str, value: &str) -> Option<usize> {
        args.windows(2).position(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn default_invocation_layout() {
        let cmd = compose_with(&settings(), &[], None);
        let args = &cmd.invocation.args;
        let last_message = cmd.last_message_path.to_string_lossy().into_owned();

        assert_eq!(cmd.invocation.program, PathBuf::from("/usr/local/bin/codex"));
        assert_eq!(
            args,
            &vec![
                "exec".to_string(),
                "--experimental-json".into(),
                "-c".into(),
                "approval_policy=on-failure".into(),
                "-c".into(),
                "sandbox_mode=workspace-write".into(),
                "--skip-git-repo-check".into(),
                "-m".into(),
                "gpt-5".into(),
                "--output-last-message".into(),
                last_message,
                "-".into(),
            ]
        );
        assert!(cmd.last_message_is_temp);
        assert!(!args.iter().any(|a| a == END_OF_FLAGS));
    }

    #[test]
    fn execution_modes_are_exclusive() {
        let full_auto = CodexCliSettings {
            full_auto: Some(true),
            approval_mode: Some(ApprovalMode::Never),
            ..settings()
        };
        let args = compose_with(&full_auto, &[], None).invocation.args;
        assert!(args.contains(&"--full-auto".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("approval_policy=")));

        let bypass = CodexCliSettings {
            dangerously_bypass_approvals_and_sandbox: Some(true),
            skip_git_repo_check: Some(false),
            ..settings()
        };
        let args = compose_with(&bypass, &[], None).invocation.args;
        assert!(args.contains(&"--dangerously-bypass-approvals-and-sandbox".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("sandbox_mode=")));
        assert!(!args.contains(&"--skip-git-repo-check".to_string()));
    }

    #[test]
    fn feature_flags_in_order() {
        let s = CodexCliSettings {
            reasoning_effort: Some(ReasoningEffort::High),
            profile: Some("ci".into()),
            oss: Some(true),
            web_search: Some(true),
            color: Some(ColorMode::Never),
            add_dirs: Some(vec!["../a".into(), "../b".into()]),
            ..settings()
        };
        let args = compose_with(&s, &[], None).invocation.args;

        let effort = pair_position(&args, "-c", "model_reasoning_effort=high").unwrap();
        let profile = pair_position(&args, "--profile", "ci").unwrap();
        let oss = args.iter().position(|a| a == "--oss").unwrap();
        let web = pair_position(&args, "-c", "tools.web_search=true").unwrap();
        let color = pair_position(&args, "--color", "never").unwrap();
        let model = pair_position(&args, "-m", "gpt-5").unwrap();
        let dir_a = pair_position(&args, "--add-dir", "../a").unwrap();
        let dir_b = pair_position(&args, "--add-dir", "../b").unwrap();

        assert!(effort < profile && profile < oss && oss < web);
        assert!(web < color && color < model && model < dir_a && dir_a < dir_b);
    }

    #[test]
    fn mcp_servers_flatten_with_explicit_empties() {
        let mut servers = IndexMap::new();
        servers.insert(
            "local".to_string(),
            McpServerConfig::Stdio(StdioMcpServer {
                command: "node".into(),
                args: Some(vec![]),
                env: Some([("API_KEY".to_string(), "k".to_string())].into_iter().collect()),
                cwd: Some("/srv".into()),
                common: McpServerCommon {
                    enabled: Some(true),
                    startup_timeout_sec: Some(10),
                    tool_timeout_sec: Some(60),
                    enabled_tools: Some(vec![]),
                    disabled_tools: Some(vec!["rm".into()]),
                },
            }),
        );
        servers.insert(
            "remote".to_string(),
            McpServerConfig::Http(HttpMcpServer {
                url: "https://mcp.example.com".into(),
                bearer_token_env_var: Some("MCP_TOKEN".into()),
                http_headers: Some(IndexMap::new()),
                ..Default::default()
            }),
        );
        servers.insert(
            "secure".to_string(),
            McpServerConfig::Http(HttpMcpServer {
                url: "https://secure.example.com".into(),
                bearer_token: Some("tok".into()),
                env_http_headers: Some(
                    [("X-Key".to_string(), "KEY_VAR".to_string())].into_iter().collect(),
                ),
                common: McpServerCommon {
                    enabled: Some(false),
                    ..Default::default()
                },
                ..Default::default()
            }),
        );
        servers.insert("  ".to_string(), McpServerConfig::stdio("ignored"));

        let s = CodexCliSettings {
            rmcp_client: Some(true),
            mcp_servers: Some(servers),
            ..settings()
        };
        let args = compose_with(&s, &[], None).invocation.args;
        let overrides: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-c")
            .map(|w| w[1].as_str())
            .collect();

        let expected = [
            "features.rmcp_client=true",
            "mcp_servers.local.enabled=true",
            "mcp_servers.local.startup_timeout_sec=10",
            "mcp_servers.local.tool_timeout_sec=60",
            "mcp_servers.local.enabled_tools=[]",
            r#"mcp_servers.local.disabled_tools=["rm"]"#,
            "mcp_servers.local.command=node",
            "mcp_servers.local.args=[]",
            "mcp_servers.local.env.API_KEY=k",
            "mcp_servers.local.cwd=/srv",
            "mcp_servers.remote.url=https://mcp.example.com",
            "mcp_servers.remote.bearer_token_env_var=MCP_TOKEN",
            "mcp_servers.remote.http_headers={}",
            "mcp_servers.secure.enabled=false",
            "mcp_servers.secure.url=https://secure.example.com",
            "mcp_servers.secure.bearer_token=tok",
            "mcp_servers.secure.env_http_headers.X-Key=KEY_VAR",
        ];
        let start = overrides.iter().position(|o| *o == expected[0]).unwrap();
        assert_eq!(&overrides[start..], &expected);
        assert!(!args.iter().any(|a| a.contains("ignored")));
    }

    #[test]
    fn config_overrides_flatten_recursively() {
        let s = CodexCliSettings {
            config_overrides: Some(
                [
                    (
                        "sandbox_workspace_write".to_string(),
                        json!({"network_access": true, "writable_roots": ["/tmp", "/var"]}),
                    ),
                    ("model_provider".to_string(), json!("openai")),
                    ("max_retries".to_string(), json!(3)),
                    ("shell_environment_policy".to_string(), json!({})),
                    ("notify".to_string(), json!([])),
                ]
                .into_iter()
                .collect(),
            ),
            ..settings()
        };
        let args = compose_with(&s, &[], None).invocation.args;
        for expected in [
            "sandbox_workspace_write.network_access=true",
            r#"sandbox_workspace_write.writable_roots=["/tmp","/var"]"#,
            "model_provider=openai",
            "max_retries=3",
            "shell_environment_policy={}",
            "notify=[]",
        ] {
            assert!(
                pair_position(&args, "-c", expected).is_some(),
                "missing override {expected}: {args:?}"
            );
        }
    }

    #[test]
    fn images_end_flags_before_stdin_marker() {
        let images = vec![
            ImageInput::new(b"png".to_vec(), "image/png"),
            ImageInput::new(b"jpg".to_vec(), "image/jpeg"),
        ];
        let cmd = compose_with(&settings(), &images, None);
        let args = &cmd.invocation.args;
        let n = args.len();

        assert_eq!(cmd.image_paths().len(), 2);
        assert_eq!(args[n - 1], STDIN_MARKER);
        assert_eq!(args[n - 2], END_OF_FLAGS);
        assert_eq!(args[n - 4], "--output-last-message");
        assert_eq!(args.iter().filter(|a| *a == END_OF_FLAGS).count(), 1);

        for path in cmd.image_paths() {
            let pos = pair_position(args, "--image", &path.to_string_lossy()).unwrap();
            assert!(pos < n - 4);
            assert!(path.exists());
        }

        let paths = cmd.image_paths().to_vec();
        drop(cmd);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn caller_supplied_last_message_path_is_kept() {
        let s = CodexCliSettings {
            output_last_message_file: Some(PathBuf::from("/tmp/out.txt")),
            ..settings()
        };
        let cmd = compose_with(&s, &[], None);
        assert!(!cmd.last_message_is_temp);
        assert!(pair_position(&cmd.invocation.args, "--output-last-message", "/tmp/out.txt").is_some());
        assert!(cmd.artifacts.is_empty());
    }

    #[test]
    fn schema_is_sanitized_and_written() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "title": "Person",
            "properties": {
                "email": {"type": "string", "format": "email"},
                "zip": {"type": "string", "pattern": "^[0-9]{5}$"},
                "format": {"type": "string", "default": "x"},
                "tags": {"type": "array", "items": {"type": "string", "format": "uri"}}
            },
            "required": ["email"]
        });
        let cmd = compose_with(&settings(), &[], Some(&schema));
        let path = cmd.schema_path.clone().unwrap();
        assert!(pair_position(&cmd.invocation.args, "--output-schema", &path.to_string_lossy()).is_some());

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "type": "object",
                "properties": {
                    "email": {"type": "string"},
                    "zip": {"type": "string"},
                    "format": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["email"],
                "additionalProperties": false
            })
        );

        drop(cmd);
        assert!(!path.exists());
    }

    #[test]
    fn empty_schema_is_skipped() {
        let cmd = compose_with(&settings(), &[], Some(&json!({})));
        assert!(cmd.schema_path.is_none());
        assert!(!cmd.invocation.args.contains(&"--output-schema".to_string()));
    }

    #[test]
    fn env_defaults_rust_log_unless_provided() {
        let s = CodexCliSettings {
            env: Some([("RUST_LOG".to_string(), "debug".to_string())].into_iter().collect()),
            ..settings()
        };
        let cmd = compose_with(&s, &[], None);
        assert_eq!(cmd.invocation.env.get("RUST_LOG").map(String::as_str), Some("debug"));
    }

    #[test]
    fn prompt_never_reaches_args() {
        let cmd = compose_with(&settings(), &[], None);
        assert_eq!(cmd.invocation.args.last().map(String::as_str), Some(STDIN_MARKER));
        assert!(cmd.invocation.args.iter().all(|a| !a.contains("prompt")));
    }

    #[test]
    fn invalid_settings_create_no_files() {
        let s = CodexCliSettings {
            full_auto: Some(true),
            dangerously_bypass_approvals_and_sandbox: Some(true),
            ..settings()
        };
        let err = compose("m", &s, &[], None, Arc::new(TempImageWriter)).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidSettings(_)));
    }
}
