//! Command channel to the engine's input.
//!
//! Commands are queued on an unbounded channel and written by one writer
//! task, so sending never waits on the engine.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Error type for command sends.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The engine input is no longer writable.
    #[error("Engine command channel closed")]
    Closed,
    /// Commands are single lines.
    #[error("Command contains a line break: {0:?}")]
    Multiline(String),
}

/// A sink accepting one console command at a time.
pub trait CommandSink: Send + Sync {
    /// Queue a command for the engine.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the command cannot be queued.
    fn send(&self, command: &str) -> Result<(), CommandError>;
}

fn check_single_line(command: &str) -> Result<(), CommandError> {
    if command.contains(['\n', '\r']) {
        return Err(CommandError::Multiline(command.to_string()));
    }
    Ok(())
}

/// Single-writer command channel backed by a writer task.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl CommandChannel {
    /// Spawn a writer task that forwards commands to `writer`, one per line.
    ///
    /// The task ends when every channel clone is dropped or a write fails.
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(command) = rx.recv().await {
                let written = async {
                    writer.write_all(command.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                }
                .await;

                if let Err(e) = written {
                    tracing::warn!(error = %e, command = %command, "Failed to write engine command");
                    break;
                }
                tracing::trace!(command = %command, "Command written");
            }
        });
        (Self { tx }, handle)
    }

    /// Wrap an existing queue; the receiver side is the writer.
    #[must_use]
    pub fn from_sender(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Whether the writer is still accepting commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl CommandSink for CommandChannel {
    fn send(&self, command: &str) -> Result<(), CommandError> {
        check_single_line(command)?;
        tracing::debug!(command = %command, "Sending engine command");
        self.tx
            .send(command.to_string())
            .map_err(|_| CommandError::Closed)
    }
}

/// Sink that records commands instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: &str) -> Result<(), CommandError> {
        check_single_line(command)?;
        self.sent
            .lock()
            .map_err(|_| CommandError::Closed)?
            .push(command.to_string());
        Ok(())
    }
}
