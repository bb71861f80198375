use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::error::Error;

const DEFAULT_ABORT_REASON: &str = "the operation was aborted";

/// Cooperative cancellation for a single generate/stream call.
///
/// Clones share state. The first reason passed to [`abort`](Self::abort) is the
/// one surfaced as [`Error::Aborted`].
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort with a reason. Later calls keep the first reason.
    pub fn abort(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the signal has been aborted.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn to_error(&self) -> Error {
        Error::Aborted {
            reason: self.reason().unwrap_or(DEFAULT_ABORT_REASON).to_string(),
        }
    }
}
