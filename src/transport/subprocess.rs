use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::command::Invocation;
use crate::error::{Error, Result};
use crate::event_parser::EventStreamParser;
use crate::types::abort::AbortSignal;
use crate::types::events::ProtocolEvent;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How long stderr may stay open after the child exits. A descendant that
/// inherited the pipe can hold it open indefinitely.
const STDERR_GRACE: Duration = Duration::from_secs(2);

const AUTH_MARKERS: &[&str] = &["not logged in", "unauthorized", "login", "auth", "401", "403"];

/// Runs one `codex exec` child per call.
pub struct SubprocessTransport {
    invocation: Invocation,
}

/// Output observed from a running child.
#[derive(Debug)]
pub enum ProcessChunk {
    /// Raw stdout bytes, not necessarily line aligned.
    Stdout(Vec<u8>),
    /// Always the last chunk.
    Exited(ProcessExit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Buffered result of [`RunningProcess::wait_with_output`].
#[derive(Debug)]
pub struct ProcessOutcome {
    pub exit: ProcessExit,
    pub events: Vec<ProtocolEvent>,
}

/// Handle to a spawned child. Dropping it kills the child.
pub struct RunningProcess {
    rx: mpsc::Receiver<Result<ProcessChunk>>,
    stop: CancellationToken,
}

impl SubprocessTransport {
    pub(crate) fn new(invocation: Invocation) -> Self {
        Self { invocation }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.invocation.program);
        cmd.args(&self.invocation.args);

        if let Some(ref cwd) = self.invocation.cwd {
            cmd.current_dir(cwd);
        }

        for (key, val) in &self.invocation.env {
            cmd.env(key, val);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        cmd
    }

    /// Spawn the child and deliver `prompt` on its stdin.
    ///
    /// Nothing is spawned when `abort` has already fired. A later abort kills
    /// the child; the outcome is still reported through the returned handle.
    pub fn spawn(&self, prompt: &str, abort: Option<&AbortSignal>) -> Result<RunningProcess> {
        if let Some(signal) = abort {
            if signal.is_aborted() {
                return Err(signal.to_error());
            }
        }

        tracing::debug!(
            program = %self.invocation.program.display(),
            args = self.invocation.args.len(),
            "spawning codex CLI"
        );

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| classify_spawn_error(&self.invocation.program, e))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("no stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn("no stderr".into()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("no stdin".into()))?;

        let stop = match abort {
            Some(signal) => signal.token().child_token(),
            None => CancellationToken::new(),
        };

        // Stdin writer task: the whole prompt, then EOF.
        let prompt = prompt.to_owned();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                tracing::debug!("failed to write prompt to stdin: {e}");
                return;
            }
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!("failed to close stdin: {e}");
            }
        });

        // Stderr reader task. Drains to EOF whatever the encoding.
        let collected: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = collected.clone();
        let mut stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        let text = text.trim_end_matches(['\n', '\r']);
                        tracing::debug!(target: "codex_cli_stderr", "{}", text);
                        sink.lock().await.push(text.to_owned());
                    }
                    Err(e) => {
                        tracing::debug!("failed to read codex CLI stderr: {e}");
                        break;
                    }
                }
            }
        });

        let (tx, rx) = mpsc::channel::<Result<ProcessChunk>>(64);

        // Stdout pump task. Owns the child and reports its exit last.
        let pump_stop = stop.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                tokio::select! {
                    _ = pump_stop.cancelled() => break,
                    read = stdout.read(&mut buf) => {
                        match read {
                            Ok(0) => break,
                            Ok(n) => {
                                if tx.send(Ok(ProcessChunk::Stdout(buf[..n].to_vec()))).await.is_err() {
                                    pump_stop.cancel();
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(Err(Error::Io(e))).await;
                                pump_stop.cancel();
                                break;
                            }
                        }
                    }
                }
            }

            let mut killed = false;
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    _ = pump_stop.cancelled(), if !killed => {
                        if let Err(e) = child.start_kill() {
                            tracing::debug!("failed to kill codex CLI: {e}");
                        }
                        killed = true;
                    }
                }
            };

            let status = match status {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("failed to wait for codex CLI: {e}");
                    let _ = tx.send(Err(Error::Io(e))).await;
                    return;
                }
            };

            tokio::select! {
                biased;
                _ = &mut stderr_task => {}
                _ = pump_stop.cancelled() => stderr_task.abort(),
                _ = tokio::time::sleep(STDERR_GRACE) => {
                    tracing::debug!("codex CLI stderr still open after exit; giving up on it");
                    stderr_task.abort();
                }
            }
            let stderr = collected.lock().await.join("\n");
            let exit = ProcessExit {
                code: status.code(),
                stderr,
            };
            let _ = tx.send(Ok(ProcessChunk::Exited(exit))).await;
        });

        Ok(RunningProcess { rx, stop })
    }
}

impl RunningProcess {
    /// Next chunk of output. `None` once the exit has been delivered.
    pub async fn next_chunk(&mut self) -> Option<Result<ProcessChunk>> {
        self.rx.recv().await
    }

    /// Kill the child. Its exit is still delivered through [`next_chunk`](Self::next_chunk).
    pub fn kill(&self) {
        self.stop.cancel();
    }

    /// Buffer all output until exit and decode it.
    pub async fn wait_with_output(mut self) -> Result<ProcessOutcome> {
        let mut stdout = Vec::new();

        while let Some(chunk) = self.next_chunk().await {
            match chunk? {
                ProcessChunk::Stdout(bytes) => stdout.extend(bytes),
                ProcessChunk::Exited(exit) => {
                    let events = EventStreamParser::parse_all(&stdout);
                    return Ok(ProcessOutcome { exit, events });
                }
            }
        }

        Err(Error::TransportClosed)
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn classify_spawn_error(program: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        return Error::CliNotFound(format!("{}: {err}", program.display()));
    }
    let message = err.to_string();
    if looks_like_auth_failure(&message) {
        Error::Authentication { message }
    } else {
        Error::Spawn(message)
    }
}

pub(crate) fn looks_like_auth_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    AUTH_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn sh(script: &str) -> SubprocessTransport {
        SubprocessTransport::new(Invocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
            env: IndexMap::new(),
            cwd: None,
        })
    }

    #[tokio::test]
    async fn prompt_is_delivered_on_stdin() {
        let prompt = "line one\nühé `tick` \"quote\" 'single' $HOME".repeat(2_000);
        let mut process = sh("cat").spawn(&prompt, None).unwrap();

        let mut echoed = Vec::new();
        let mut exit = None;
        while let Some(chunk) = process.next_chunk().await {
            match chunk.unwrap() {
                ProcessChunk::Stdout(bytes) => echoed.extend(bytes),
                ProcessChunk::Exited(e) => exit = Some(e),
            }
        }
        assert_eq!(String::from_utf8(echoed).unwrap(), prompt);
        assert!(exit.unwrap().success());
    }

    #[tokio::test]
    async fn events_and_exit_code_are_reported() {
        let transport = sh(
            r#"printf '{"type":"thread.started","thread_id":"t1"}\n{"type":"turn.started"}'; echo oops >&2; exit 3"#,
        );
        let outcome = transport
            .spawn("", None)
            .unwrap()
            .wait_with_output()
            .await
            .unwrap();
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[0].session_id(), Some("t1"));
        assert_eq!(outcome.exit.code, Some(3));
        assert_eq!(outcome.exit.stderr, "oops");
    }

    #[tokio::test]
    async fn invalid_utf8_stderr_keeps_exit_code() {
        let transport = sh(
            r#"printf 'bad \377 byte\n' >&2; sleep 0.3; i=0; while [ $i -lt 2000 ]; do echo "line $i" >&2; i=$((i+1)); done; exit 3"#,
        );
        let outcome = transport
            .spawn("", None)
            .unwrap()
            .wait_with_output()
            .await
            .unwrap();
        assert_eq!(outcome.exit.code, Some(3));
        assert!(outcome.exit.stderr.starts_with("bad \u{FFFD} byte\n"));
        assert!(outcome.exit.stderr.ends_with("line 1999"));
    }

    #[tokio::test]
    async fn abort_is_honored_while_descendant_holds_stderr() {
        let signal = AbortSignal::new();
        let process = sh("sleep 20 >/dev/null </dev/null & exit 0")
            .spawn("", Some(&signal))
            .unwrap();

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.abort("stop");
        });

        let outcome = tokio::time::timeout(Duration::from_secs(3), process.wait_with_output())
            .await
            .expect("abort was ignored")
            .unwrap();
        assert_eq!(outcome.exit.code, Some(0));
    }

    #[tokio::test]
    async fn exit_is_reported_when_descendant_holds_stderr() {
        let process = sh("echo early >&2; sleep 20 >/dev/null </dev/null & exit 4")
            .spawn("", None)
            .unwrap();

        let outcome = tokio::time::timeout(
            STDERR_GRACE + Duration::from_secs(3),
            process.wait_with_output(),
        )
        .await
        .expect("exit was never reported")
        .unwrap();
        assert_eq!(outcome.exit.code, Some(4));
        assert_eq!(outcome.exit.stderr, "early");
    }

    #[tokio::test]
    async fn pre_aborted_signal_spawns_nothing() {
        let signal = AbortSignal::new();
        signal.abort("cancelled by caller");
        let err = sh("exit 0").spawn("", Some(&signal)).err().unwrap();
        assert_eq!(err.to_string(), "cancelled by caller");
    }

    #[tokio::test]
    async fn abort_kills_running_child() {
        let signal = AbortSignal::new();
        let process = sh("exec sleep 30").spawn("", Some(&signal)).unwrap();

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.abort("stop");
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), process.wait_with_output())
            .await
            .expect("child was not killed")
            .unwrap();
        assert_eq!(outcome.exit.code, None);
    }

    #[tokio::test]
    async fn missing_binary_is_cli_not_found() {
        let transport = SubprocessTransport::new(Invocation {
            program: PathBuf::from("/nonexistent/codex"),
            args: vec![],
            env: IndexMap::new(),
            cwd: None,
        });
        assert!(matches!(
            transport.spawn("", None).err().unwrap(),
            Error::CliNotFound(_)
        ));
    }

    #[test]
    fn auth_markers() {
        assert!(looks_like_auth_failure("Error: Not logged in"));
        assert!(looks_like_auth_failure("HTTP 401"));
        assert!(!looks_like_auth_failure("permission denied"));
    }
}
