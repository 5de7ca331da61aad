//! Child-process stdio transport (spec §4.1 "Stdio").
//!
//! Spawns the configured command and speaks newline-delimited JSON over its
//! stdin/stdout, following the teacher's `ChildProcessTransport`
//! (`turbomcp-transport/src/child_process.rs`) for process lifecycle and its
//! `StdioTransport` (`stdio.rs`) for `LinesCodec` framing. Stderr lines are
//! forwarded to `tracing` at debug level rather than parsed.

use std::process::Stdio;

use async_trait::async_trait;
use fluxmcp_protocol::{Error, Frame, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use crate::config::StdioConfig;
use crate::core::Transport;

type Writer = FramedWrite<tokio::process::ChildStdin, LinesCodec>;

/// Transport over a spawned child process's stdio pipes.
#[derive(Debug)]
pub struct StdioTransport {
    config: StdioConfig,
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<Writer>>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    alive: std::sync::atomic::AtomicBool,
}

impl StdioTransport {
    /// Build a transport for the given child-process configuration. Does
    /// not spawn the process; call [`Transport::start`] for that.
    #[must_use]
    pub fn new(config: StdioConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            writer: Mutex::new(None),
            inbound: Mutex::new(None),
            reader_task: Mutex::new(None),
            alive: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<()> {
        if self.config.command.is_empty() {
            return Err(Error::configuration("stdio transport requires a command"));
        }

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_directory {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::transport(format!("failed to spawn child process: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::transport("child process has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transport("child process has no stdout"))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::read_loop(stdout, stderr, tx));

        *self.child.lock().await = Some(child);
        *self.writer.lock().await = Some(FramedWrite::new(stdin, LinesCodec::new()));
        *self.inbound.lock().await = Some(rx);
        *self.reader_task.lock().await = Some(task);
        self.alive.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        let line = frame_to_line(frame)?;
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::transport("stdio transport not started"))?;
        writer
            .send(line)
            .await
            .map_err(|e| Error::transport(format!("stdio write failed: {e}")))
    }

    async fn recv(&self) -> Result<Option<Frame>> {
        let mut guard = self.inbound.lock().await;
        let rx = guard
            .as_mut()
            .ok_or_else(|| Error::transport("stdio transport not started"))?;
        Ok(rx.recv().await)
    }

    async fn stop(&self) -> Result<()> {
        self.alive
            .store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        *self.writer.lock().await = None;
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        Ok(())
    }

    fn alive(&self) -> bool {
        self.alive.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl StdioTransport {
    async fn read_loop(
        stdout: tokio::process::ChildStdout,
        stderr: Option<tokio::process::ChildStderr>,
        tx: mpsc::UnboundedSender<Frame>,
    ) {
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "fluxmcp_transport::stdio", "child stderr: {line}");
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    match Frame::parse(line.as_bytes()) {
                        Ok(frame) => {
                            if tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("dropping unparseable stdio frame: {e}"),
                    }
                }
                Ok(None) => {
                    error!("child process stdout closed");
                    break;
                }
                Err(e) => {
                    error!("error reading child process stdout: {e}");
                    break;
                }
            }
        }
    }
}

/// Serialize a frame to a single line of JSON. Per spec §4.1, frames with
/// embedded newlines are forbidden; any such value indicates a bug upstream
/// (none of our payload types can produce bare newlines once JSON-escaped).
fn frame_to_line(frame: &Frame) -> Result<String> {
    let value = match frame {
        Frame::Request(r) => serde_json::to_string(r),
        Frame::Response(r) => serde_json::to_string(r),
        Frame::Notification(n) => serde_json::to_string(n),
    }
    .map_err(Error::from)?;
    debug_assert!(
        !value.contains('\n'),
        "serialized frame contained an embedded newline"
    );
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_to_line_has_no_embedded_newline() {
        let frame = Frame::parse(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        let line = frame_to_line(&frame).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"method\":\"ping\""));
    }

    #[tokio::test]
    async fn start_with_empty_command_is_configuration_error() {
        let transport = StdioTransport::new(StdioConfig::default());
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }
}
