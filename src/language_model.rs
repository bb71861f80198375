use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::assembler::{self, StreamCall, TurnState};
use crate::cleanup::{ImageWriter, TempImageWriter};
use crate::command::{self, ComposedCommand};
use crate::error::Result;
use crate::settings_merge::merge_settings;
use crate::transport::subprocess::SubprocessTransport;
use crate::types::content::StreamPart;
use crate::types::generation::{GenerateRequest, GenerationResult, SamplingOptions, Warning};
use crate::types::settings::CodexCliSettings;

/// Provider identifier reported by [`CodexLanguageModel::provider`].
pub const PROVIDER_ID: &str = "codex-cli";

const STREAM_BUFFER: usize = 64;

/// A language model backed by `codex exec`.
///
/// Every call runs its own child process. Clones share the session cache.
///
/// ```rust,no_run
/// # async fn example() -> codex_cli_rs::Result<()> {
/// use codex_cli_rs::{CodexCliSettings, CodexLanguageModel, GenerateRequest};
///
/// let model = CodexLanguageModel::new("gpt-5", CodexCliSettings::default())?;
/// let result = model.generate(GenerateRequest::new("Summarize README.md")).await?;
/// println!("{}", result.text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CodexLanguageModel {
    model_id: String,
    settings: Arc<CodexCliSettings>,
    image_writer: Arc<dyn ImageWriter>,
    last_session_id: Arc<Mutex<Option<String>>>,
}

impl CodexLanguageModel {
    /// Create a model. Fails if the settings combine incompatible options.
    pub fn new(model_id: impl Into<String>, settings: CodexCliSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            model_id: model_id.into(),
            settings: Arc::new(settings),
            image_writer: Arc::new(TempImageWriter),
            last_session_id: Arc::new(Mutex::new(None)),
        })
    }

    /// Replace how prompt images are written to disk.
    #[must_use]
    pub fn with_image_writer(mut self, writer: Arc<dyn ImageWriter>) -> Self {
        self.image_writer = writer;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn provider(&self) -> &'static str {
        PROVIDER_ID
    }

    pub fn settings(&self) -> &CodexCliSettings {
        &self.settings
    }

    /// Session id of the most recent call that reported one.
    pub async fn last_session_id(&self) -> Option<String> {
        self.last_session_id.lock().await.clone()
    }

    /// Run one turn to completion.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerationResult> {
        let (command, warnings) = self.prepare(&request)?;

        let transport = SubprocessTransport::new(command.invocation.clone());
        let outcome = transport
            .spawn(&request.prompt, request.abort_signal.as_ref())?
            .wait_with_output()
            .await?;

        let mut state = TurnState::default();
        for event in &outcome.events {
            state.observe(event);
        }

        assembler::resolve_exit(
            &state,
            &outcome.exit,
            request.abort_signal.as_ref(),
            &request.prompt_excerpt(),
        )?;
        assembler::remember_session(&self.last_session_id, &state).await;

        let text = assembler::final_text(&state, &command.last_message_path).await;
        Ok(assembler::build_result(&state, text, warnings, &self.model_id))
    }

    /// Run one turn, yielding parts as the child produces them.
    ///
    /// Failures before the child starts are returned directly; later ones end
    /// the stream with a single `Err`. Dropping the stream kills the child.
    pub async fn stream(
        &self,
        request: GenerateRequest,
    ) -> Result<ReceiverStream<Result<StreamPart>>> {
        let (command, warnings) = self.prepare(&request)?;

        let transport = SubprocessTransport::new(command.invocation.clone());
        let process = transport.spawn(&request.prompt, request.abort_signal.as_ref())?;

        let call = StreamCall {
            model_id: self.model_id.clone(),
            warnings,
            prompt_excerpt: request.prompt_excerpt(),
            abort: request.abort_signal.clone(),
            command,
            session_cache: self.last_session_id.clone(),
        };

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(assembler::drive_stream(process, call, tx));

        Ok(ReceiverStream::new(rx))
    }

    /// Merge call options, compose the command and collect warnings.
    fn prepare(&self, request: &GenerateRequest) -> Result<(ComposedCommand, Vec<Warning>)> {
        if let Some(signal) = request.abort_signal.as_ref().filter(|s| s.is_aborted()) {
            return Err(signal.to_error());
        }

        let settings = merge_settings(&self.settings, request.provider_options.as_ref());
        let command = command::compose(
            &self.model_id,
            &settings,
            &request.images,
            request.output_schema(),
            self.image_writer.clone(),
        )?;
        tracing::debug!(
            model = %self.model_id,
            images = command.image_paths().len(),
            schema = command.schema_path.is_some(),
            "composed codex exec invocation"
        );

        let mut warnings = sampling_warnings(&request.sampling);
        warnings.extend(request.warnings.iter().cloned());
        Ok((command, warnings))
    }
}

impl std::fmt::Debug for CodexLanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodexLanguageModel")
            .field("model_id", &self.model_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// One warning per sampling parameter Codex ignores.
fn sampling_warnings(sampling: &SamplingOptions) -> Vec<Warning> {
    let set = [
        ("temperature", sampling.temperature.is_some()),
        ("topP", sampling.top_p.is_some()),
        ("topK", sampling.top_k.is_some()),
        ("presencePenalty", sampling.presence_penalty.is_some()),
        ("frequencyPenalty", sampling.frequency_penalty.is_some()),
        ("stopSequences", !sampling.stop_sequences.is_empty()),
        ("seed", sampling.seed.is_some()),
    ];
    set.into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| Warning::unsupported(name))
        .collect()
}
