//! Turns protocol events and the process exit into results and stream parts.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, Mutex};

use crate::command::ComposedCommand;
use crate::error::{Error, Result};
use crate::event_parser::EventStreamParser;
use crate::tool_tracker::{generate_id, ItemPhase, ToolCallTracker};
use crate::transport::subprocess::{ProcessChunk, ProcessExit, RunningProcess};
use crate::types::abort::AbortSignal;
use crate::types::content::{ContentBlock, StreamPart};
use crate::types::events::{ItemDetails, ProtocolEvent, ReportedUsage};
use crate::types::generation::{
    FinishReason, GenerationResult, ProviderMetadata, ResponseMetadata, TokenUsage, Warning,
};

const TURN_FAILED_FALLBACK: &str = "codex turn failed";
const STREAM_ERROR_FALLBACK: &str = "codex reported an error";

/// What has been learned about the turn so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnState {
    pub session_id: Option<String>,
    pub usage: Option<ReportedUsage>,
    pub finish_reason: Option<String>,
    /// Latest assistant message text.
    pub text: Option<String>,
    /// Latest failure reported on the event stream.
    pub failure: Option<String>,
}

impl TurnState {
    /// Record one event. Returns true when it revealed the session id.
    pub fn observe(&mut self, event: &ProtocolEvent) -> bool {
        match event {
            ProtocolEvent::ThreadStarted { .. } | ProtocolEvent::SessionCreated { .. } => {
                if self.session_id.is_none() {
                    if let Some(id) = event.session_id() {
                        self.session_id = Some(id.to_string());
                        return true;
                    }
                }
            }
            ProtocolEvent::TurnCompleted { usage, finish_reason } => {
                if usage.is_some() {
                    self.usage = usage.clone();
                }
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason.clone();
                }
            }
            ProtocolEvent::TurnFailed { message } => {
                self.failure = Some(non_empty_or(message, TURN_FAILED_FALLBACK));
            }
            ProtocolEvent::Error { message } => {
                self.failure = Some(non_empty_or(message, STREAM_ERROR_FALLBACK));
            }
            ProtocolEvent::ItemStarted { item }
            | ProtocolEvent::ItemUpdated { item }
            | ProtocolEvent::ItemCompleted { item } => {
                if let ItemDetails::AgentMessage { text: Some(text) } = &item.details {
                    if !text.is_empty() {
                        self.text = Some(text.clone());
                    }
                }
            }
            ProtocolEvent::Unknown { event_type, .. } => {
                tracing::debug!(event_type = %event_type, "ignoring unknown codex event");
            }
            ProtocolEvent::TurnStarted => {}
        }
        false
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.usage.as_ref().map(TokenUsage::from).unwrap_or_default()
    }

    pub fn finish(&self) -> FinishReason {
        FinishReason::from_raw(self.finish_reason.as_deref())
    }

    fn provider_metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            session_id: self.session_id.clone(),
        }
    }
}

fn non_empty_or(message: &Option<String>, fallback: &str) -> String {
    match message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => fallback.to_string(),
    }
}

/// Decide whether the call succeeded.
///
/// An abort takes precedence over a failure event, which takes precedence
/// over the exit code.
pub fn resolve_exit(
    state: &TurnState,
    exit: &ProcessExit,
    abort: Option<&AbortSignal>,
    prompt_excerpt: &str,
) -> Result<()> {
    if let Some(signal) = abort.filter(|s| s.is_aborted()) {
        return Err(signal.to_error());
    }

    if let Some(ref message) = state.failure {
        return Err(Error::TurnFailed {
            message: message.clone(),
            stderr: exit.stderr.clone(),
            prompt_excerpt: prompt_excerpt.to_string(),
        });
    }

    if !exit.success() {
        return Err(Error::ProcessExit {
            code: exit.code,
            stderr: exit.stderr.clone(),
            prompt_excerpt: prompt_excerpt.to_string(),
        });
    }

    Ok(())
}

/// Read the last-message capture file. Missing or blank files yield `None`.
pub async fn read_last_message(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let trimmed = contents.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), "no last-message file: {e}");
            None
        }
    }
}

/// Final text: the event stream's, falling back to the capture file.
pub(crate) async fn final_text(state: &TurnState, last_message_path: &Path) -> Option<String> {
    match state.text {
        Some(ref text) => Some(text.clone()),
        None => read_last_message(last_message_path).await,
    }
}

fn response_metadata(model_id: &str) -> ResponseMetadata {
    ResponseMetadata {
        id: generate_id("codex"),
        timestamp: SystemTime::now(),
        model_id: model_id.to_string(),
    }
}

/// Assemble a non-streaming result from a finished turn.
pub fn build_result(
    state: &TurnState,
    text: Option<String>,
    warnings: Vec<Warning>,
    model_id: &str,
) -> GenerationResult {
    let content = text
        .filter(|t| !t.is_empty())
        .map(|text| vec![ContentBlock::Text { text }])
        .unwrap_or_default();

    GenerationResult {
        content,
        usage: state.token_usage(),
        finish_reason: state.finish(),
        warnings,
        response: response_metadata(model_id),
        provider_metadata: state.provider_metadata(),
    }
}

/// Incrementally converts events into stream parts for one call.
#[derive(Debug)]
pub struct StreamAssembler {
    model_id: String,
    state: TurnState,
    tracker: ToolCallTracker,
}

impl StreamAssembler {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            state: TurnState::default(),
            tracker: ToolCallTracker::new(),
        }
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Parts produced by one event, in emission order.
    pub fn on_event(&mut self, event: &ProtocolEvent) -> Vec<StreamPart> {
        let mut parts = Vec::new();

        if self.state.observe(event) {
            parts.push(StreamPart::ResponseMetadata(response_metadata(&self.model_id)));
        }

        let phase = match event {
            ProtocolEvent::ItemStarted { .. } => Some(ItemPhase::Started),
            ProtocolEvent::ItemUpdated { .. } => Some(ItemPhase::Updated),
            ProtocolEvent::ItemCompleted { .. } => Some(ItemPhase::Completed),
            _ => None,
        };
        if let (Some(phase), Some(item)) = (phase, event.item()) {
            parts.extend(self.tracker.track(phase, item));
        }

        parts
    }

    /// Text block (when non-empty) followed by the finish part.
    pub fn closing_parts(&self, text: Option<String>) -> Vec<StreamPart> {
        let unfinished = self.tracker.in_flight();
        if unfinished > 0 {
            tracing::debug!(unfinished, "turn ended with tool items that never completed");
        }

        let mut parts = Vec::new();

        if let Some(text) = text.filter(|t| !t.is_empty()) {
            let id = generate_id("text");
            parts.push(StreamPart::TextStart { id: id.clone() });
            parts.push(StreamPart::TextDelta {
                id: id.clone(),
                delta: text,
            });
            parts.push(StreamPart::TextEnd { id });
        }

        parts.push(StreamPart::Finish {
            finish_reason: self.state.finish(),
            usage: self.state.token_usage(),
            provider_metadata: self.state.provider_metadata(),
        });

        parts
    }
}

/// Everything the streaming task owns for the lifetime of one call.
pub(crate) struct StreamCall {
    pub model_id: String,
    pub warnings: Vec<Warning>,
    pub prompt_excerpt: String,
    pub abort: Option<AbortSignal>,
    /// Kept alive so its temp files outlive the child.
    pub command: ComposedCommand,
    pub session_cache: Arc<Mutex<Option<String>>>,
}

/// Pump a running process into `tx` until it finishes, fails or the receiver goes away.
pub(crate) async fn drive_stream(
    mut process: RunningProcess,
    call: StreamCall,
    tx: mpsc::Sender<Result<StreamPart>>,
) {
    let mut assembler = StreamAssembler::new(call.model_id.clone());
    let mut parser = EventStreamParser::new();

    if tx
        .send(Ok(StreamPart::StreamStart {
            warnings: call.warnings.clone(),
        }))
        .await
        .is_err()
    {
        return;
    }

    let exit = loop {
        let chunk = tokio::select! {
            chunk = process.next_chunk() => chunk,
            _ = tx.closed() => return,
        };

        let (events, exit) = match chunk {
            Some(Ok(ProcessChunk::Stdout(bytes))) => (parser.push(&bytes), None),
            Some(Ok(ProcessChunk::Exited(exit))) => (parser.finish().into_iter().collect(), Some(exit)),
            Some(Err(e)) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
            None => {
                let _ = tx.send(Err(Error::TransportClosed)).await;
                return;
            }
        };

        for event in &events {
            for part in assembler.on_event(event) {
                if let StreamPart::ResponseMetadata(_) = part {
                    remember_session(&call.session_cache, assembler.state()).await;
                }
                if tx.send(Ok(part)).await.is_err() {
                    return;
                }
            }
        }

        if let Some(exit) = exit {
            break exit;
        }
    };

    if let Err(e) = resolve_exit(
        assembler.state(),
        &exit,
        call.abort.as_ref(),
        &call.prompt_excerpt,
    ) {
        let _ = tx.send(Err(e)).await;
        return;
    }

    let text = final_text(assembler.state(), &call.command.last_message_path).await;
    for part in assembler.closing_parts(text) {
        if tx.send(Ok(part)).await.is_err() {
            return;
        }
    }
}

pub(crate) async fn remember_session(cache: &Mutex<Option<String>>, state: &TurnState) {
    if let Some(ref id) = state.session_id {
        *cache.lock().await = Some(id.clone());
    }
}
