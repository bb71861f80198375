use std::io;

/// All errors that can occur while driving the Codex CLI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("codex CLI not found: {0}")]
    CliNotFound(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to spawn codex CLI: {0}")]
    Spawn(String),

    #[error("codex CLI authentication failed: {message}")]
    Authentication { message: String },

    #[error("codex CLI exited with code {}: {stderr}", display_code(*.code))]
    ProcessExit {
        code: Option<i32>,
        stderr: String,
        prompt_excerpt: String,
    },

    #[error("codex turn failed: {message}")]
    TurnFailed {
        message: String,
        stderr: String,
        prompt_excerpt: String,
    },

    /// The caller's abort signal fired. Displays the caller-supplied reason verbatim.
    #[error("{reason}")]
    Aborted { reason: String },

    #[error("failed to parse event: {reason}")]
    EventParse { reason: String },

    #[error("process output closed before exit was observed")]
    TransportClosed,

    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Exit code of the child, if this error came from a process exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ProcessExit { code, .. } => *code,
            _ => None,
        }
    }

    /// Captured stderr for process-level failures.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Error::ProcessExit { stderr, .. } | Error::TurnFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }
}

fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
