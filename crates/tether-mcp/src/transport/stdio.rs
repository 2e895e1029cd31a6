//! Child-process transport: newline-delimited JSON over stdin/stdout.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;

use super::framing::{LineFramer, with_newline};
use super::{EventSink, Transport, TransportEvents};
use crate::config::TransportKind;
use crate::error::{McpError, Result};

/// Transport that spawns the server as a child process.
///
/// Stdout carries messages; each stderr line is forwarded as a
/// [`TransportEvent::Error`](super::TransportEvent::Error). Process exit for
/// any reason delivers `Closed`.
///
/// Only the stdin writer sits behind an async lock. `stop` does not wait for a
/// write in flight: it signals shutdown, which abandons the write, and kills
/// the child.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    send_timeout: Duration,
    stdin: Mutex<Option<ChildStdin>>,
    state: parking_lot::Mutex<StdioState>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct StdioState {
    started: bool,
    kill: Option<oneshot::Sender<()>>,
    readers: Vec<JoinHandle<()>>,
    sink: Option<EventSink>,
}

impl StdioTransport {
    /// Create a transport for `command`; nothing is spawned until `start`.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            send_timeout,
            stdin: Mutex::new(None),
            state: parking_lot::Mutex::new(StdioState::default()),
            shutdown: watch::Sender::new(false),
        }
    }

    fn is_open(&self) -> bool {
        self.state
            .lock()
            .sink
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }

    fn spawn(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|source| McpError::Spawn {
            command: self.command.clone(),
            source,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn start(&self) -> Result<TransportEvents> {
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(McpError::transport("stdio transport already started"));
            }
            state.started = true;
        }

        let mut child = self.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::transport("failed to capture stderr"))?;

        let pid = child.id();
        let (sink, events) = EventSink::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (drained_tx, drained_rx) = oneshot::channel();

        let stdout_task = tokio::spawn(read_stdout(stdout, sink.clone(), drained_tx));
        let stderr_task = tokio::spawn(read_stderr(stderr, sink.clone(), self.command.clone()));
        tokio::spawn(watch_child(
            child,
            kill_rx,
            drained_rx,
            sink.clone(),
            self.command.clone(),
        ));

        tracing::info!(command = %self.command, pid = ?pid, "spawned MCP server process");

        *self.stdin.lock().await = Some(stdin);
        {
            let mut state = self.state.lock();
            state.kill = Some(kill_tx);
            state.readers = vec![stdout_task, stderr_task];
            state.sink = Some(sink);
        }
        Ok(events)
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        let mut shutdown = self.shutdown.subscribe();
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpError::NotConnected)?;

        let framed = with_newline(message);
        let write = async {
            stdin.write_all(&framed).await?;
            stdin.flush().await
        };
        let outcome = tokio::select! {
            outcome = tokio::time::timeout(self.send_timeout, write) => outcome,
            _ = shutdown.wait_for(|stopped| *stopped) => return Err(McpError::NotConnected),
        };
        match outcome {
            Ok(Ok(())) => {
                tracing::trace!(bytes = framed.len(), "sent MCP message over stdio");
                Ok(())
            }
            Ok(Err(e)) => Err(McpError::transport(format!(
                "failed to write to '{}': {}",
                self.command, e
            ))),
            Err(_) => Err(McpError::transport(format!(
                "write to '{}' did not complete within {:?}",
                self.command, self.send_timeout
            ))),
        }
    }

    async fn stop(&self) {
        let (kill, readers, sink) = {
            let mut state = self.state.lock();
            (
                state.kill.take(),
                std::mem::take(&mut state.readers),
                state.sink.take(),
            )
        };
        self.shutdown.send_replace(true);

        if let Some(kill) = kill {
            let _ = kill.send(());
        }
        for reader in &readers {
            reader.abort();
        }
        // Any in-flight write has been told to give up, so this is brief.
        self.stdin.lock().await.take();
        if let Some(sink) = sink {
            sink.close();
            tracing::debug!(command = %self.command, "stopped stdio transport");
        }
    }
}

async fn read_stdout(
    mut stdout: tokio::process::ChildStdout,
    sink: EventSink,
    drained: oneshot::Sender<()>,
) {
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; 8192];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for message in framer.push(&buf[..n]) {
                    sink.message(message);
                }
            }
            Err(e) => {
                sink.error(format!("failed to read server stdout: {}", e));
                break;
            }
        }
    }
    if framer.pending() > 0 {
        tracing::debug!(
            bytes = framer.pending(),
            "discarding unterminated output at end of stdout"
        );
    }
    let _ = drained.send(());
}

async fn read_stderr(stderr: tokio::process::ChildStderr, sink: EventSink, command: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                tracing::debug!(command = %command, stderr = %line, "MCP server stderr");
                sink.error(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(command = %command, error = %e, "stopped reading server stderr");
                break;
            }
        }
    }
}

/// Grace period for the last stdout bytes after the process exits.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Reap the child, killing it first if asked to (or if the handle is dropped).
///
/// `Closed` is delivered only after stdout has been drained, so a response
/// written just before exit still reaches the connection.
async fn watch_child(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    drained: oneshot::Receiver<()>,
    sink: EventSink,
    command: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(command = %command, error = %e, "failed to kill MCP server");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => tracing::info!(command = %command, %status, "MCP server process exited"),
        Err(e) => tracing::warn!(command = %command, error = %e, "failed to wait for MCP server"),
    }
    let _ = tokio::time::timeout(DRAIN_GRACE, drained).await;
    sink.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;

    fn transport(command: &str, args: &[&str]) -> StdioTransport {
        StdioTransport::new(
            command,
            args.iter().map(|s| s.to_string()).collect(),
            BTreeMap::new(),
            Duration::from_secs(5),
        )
    }

    async fn next_event(events: &mut TransportEvents) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let transport = transport("nonexistent-mcp-server-12345", &[]);
        match transport.start().await {
            Err(McpError::Spawn { command, source }) => {
                assert_eq!(command, "nonexistent-mcp-server-12345");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected spawn failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let transport = transport("cat", &[]);
        assert!(matches!(
            transport.send(b"{}").await,
            Err(McpError::NotConnected)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cat_echoes_framed_messages() {
        let transport = transport("cat", &[]);
        let mut events = transport.start().await.unwrap();

        transport.send(br#"{"id":1}"#).await.unwrap();
        transport.send(b"{\"id\":2}\n").await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Message(br#"{"id":1}"#.to_vec())
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Message(br#"{"id":2}"#.to_vec())
        );

        transport.stop().await;
        assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
        assert!(matches!(
            transport.send(b"{}").await,
            Err(McpError::NotConnected)
        ));

        // Stop is safe to repeat.
        transport.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exit_closes_exactly_once() {
        let transport = transport("sh", &["-c", "exit 3"]);
        let mut events = transport.start().await.unwrap();

        assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
        transport.stop().await;
        // Nothing follows Closed, not even after stop.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), events.recv())
                .await
                .map_or(true, |event| event.is_none())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_does_not_wait_for_stalled_write() {
        let transport = std::sync::Arc::new(transport("sleep", &["60"]));
        let mut events = transport.start().await.unwrap();

        // Far more than a pipe buffer; the child never reads it.
        let writer = std::sync::Arc::clone(&transport);
        let send = tokio::spawn(async move { writer.send(&vec![b' '; 4 << 20]).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!send.is_finished());

        tokio::time::timeout(Duration::from_secs(2), transport.stop())
            .await
            .expect("stop waited for the stalled write");
        let sent = tokio::time::timeout(Duration::from_secs(2), send)
            .await
            .expect("stalled write was not abandoned")
            .unwrap();
        assert!(sent.is_err());
        assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_forwarded_not_fatal() {
        let transport = transport("sh", &["-c", "echo 'starting up' >&2; sleep 5"]);
        let mut events = transport.start().await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Error("starting up".to_string())
        );
        transport.send(b"{}").await.unwrap();

        transport.stop().await;
        assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
    }
}
