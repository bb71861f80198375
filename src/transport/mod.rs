//! Locating and running the Codex CLI.

pub mod cli_discovery;
pub mod subprocess;

pub use cli_discovery::{resolve_base_invocation, BaseInvocation};
pub use subprocess::{ProcessChunk, ProcessExit, ProcessOutcome, RunningProcess, SubprocessTransport};
