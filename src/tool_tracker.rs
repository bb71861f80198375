//! Pairs Codex work items into tool-call / tool-result stream parts.

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::types::content::{StreamPart, ToolCall, ToolResult};
use crate::types::events::{ItemDetails, ThreadItem};

/// Lifecycle stage of the `item.*` event being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Started,
    Updated,
    Completed,
}

#[derive(Debug)]
struct ActiveToolItem {
    tool_call_id: String,
    tool_name: String,
    input: Value,
    call_emitted: bool,
}

/// Tracks in-flight tool items for one call.
///
/// Every tracked item announces exactly one call before at most one result.
/// An item whose `item.completed` never arrives never gets a result. Items
/// without an id are only reported once they complete.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    active: IndexMap<String, ActiveToolItem>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one item event; returns the parts it produces, in order.
    pub fn track(&mut self, phase: ItemPhase, item: &ThreadItem) -> Vec<StreamPart> {
        let Some(tool_name) = tool_name(&item.details) else {
            return Vec::new();
        };

        // Without an id there is nothing to pair events on, so only the
        // completed event is reported, as a call and its result together.
        let item_id = match item.id {
            Some(ref id) if !id.is_empty() => id.clone(),
            _ if phase == ItemPhase::Completed => generate_id("tool"),
            _ => return Vec::new(),
        };

        let active = self
            .active
            .entry(item_id.clone())
            .or_insert_with(|| ActiveToolItem {
                tool_call_id: item_id.clone(),
                tool_name,
                input: tool_input(&item.details),
                call_emitted: false,
            });

        let mut parts = Vec::new();
        if !active.call_emitted {
            active.call_emitted = true;
            parts.push(StreamPart::ToolCall(ToolCall {
                tool_call_id: active.tool_call_id.clone(),
                tool_name: active.tool_name.clone(),
                input: active.input.clone(),
                provider_executed: true,
            }));
        }

        if phase == ItemPhase::Completed {
            if let Some(active) = self.active.shift_remove(&item_id) {
                let (result, is_error) = tool_result(&item.details);
                parts.push(StreamPart::ToolResult(ToolResult {
                    tool_call_id: active.tool_call_id,
                    tool_name: active.tool_name,
                    result,
                    is_error,
                }));
            }
        }

        parts
    }

    /// Number of tool items announced but not yet completed.
    pub(crate) fn in_flight(&self) -> usize {
        self.active.len()
    }
}

fn tool_name(details: &ItemDetails) -> Option<String> {
    match details {
        ItemDetails::CommandExecution(_) => Some("exec".into()),
        ItemDetails::FileChange(_) => Some("patch".into()),
        ItemDetails::McpToolCall(call) => Some(
            call.tool
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "mcp_tool".into()),
        ),
        ItemDetails::WebSearch(_) => Some("web_search".into()),
        _ => None,
    }
}

fn tool_input(details: &ItemDetails) -> Value {
    match details {
        ItemDetails::CommandExecution(exec) => json!({
            "command": exec.command,
            "cwd": exec.cwd,
        }),
        ItemDetails::FileChange(patch) => json!({ "changes": patch.changes }),
        ItemDetails::McpToolCall(call) => json!({
            "server": call.server,
            "tool": call.tool,
            "arguments": call.arguments,
        }),
        ItemDetails::WebSearch(search) => json!({ "query": search.query }),
        _ => Value::Null,
    }
}

fn tool_result(details: &ItemDetails) -> (Value, bool) {
    match details {
        ItemDetails::CommandExecution(exec) => {
            let failed = exec.exit_code.is_some_and(|code| code != 0) || is_failed(&exec.status);
            let result = json!({
                "command": exec.command,
                "aggregatedOutput": exec.aggregated_output,
                "exitCode": exec.exit_code,
                "status": exec.status,
            });
            (result, failed)
        }
        ItemDetails::FileChange(patch) => {
            let result = json!({ "changes": patch.changes, "status": patch.status });
            (result, is_failed(&patch.status))
        }
        ItemDetails::McpToolCall(call) => {
            let error = call.error_message();
            let failed = is_failed(&call.status) || error.is_some();
            let result = json!({
                "server": call.server,
                "tool": call.tool,
                "result": call.result,
                "error": error,
                "status": call.status,
            });
            (result, failed)
        }
        ItemDetails::WebSearch(search) => {
            let result = json!({ "query": search.query, "status": search.status });
            (result, false)
        }
        _ => (Value::Null, false),
    }
}

fn is_failed(status: &Option<String>) -> bool {
    status.as_deref() == Some("failed")
}

/// Random identifier of the form `<prefix>_<16 hex digits>`.
pub(crate) fn generate_id(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let suffix: u64 = rng.random();
    format!("{prefix}_{suffix:016x}")
}
