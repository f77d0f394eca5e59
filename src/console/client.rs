//! The public console API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::chunk::ChunkOptions;
use super::dispatcher::Control;
use super::error::ExchangeError;
use super::exchange::{ArmedExchange, ExchangeHandle};
use super::matcher::LinePattern;
use super::single::SingleOptions;
use super::watcher::{ExchangeResult, WatchKind};
use crate::engine::{CommandError, CommandSink};

/// Issues watched commands against the engine console.
///
/// Cheap to clone; every clone talks to the same dispatcher.
#[derive(Clone)]
pub struct Console {
    control: mpsc::UnboundedSender<Control>,
    sink: Arc<dyn CommandSink>,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("closed", &self.control.is_closed())
            .finish_non_exhaustive()
    }
}

impl Console {
    pub(crate) fn new(control: mpsc::UnboundedSender<Control>, sink: Arc<dyn CommandSink>) -> Self {
        Self { control, sink }
    }

    /// Register a watcher and return it armed, before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Pattern` if the pattern lacks a group the kind
    /// needs, `StreamClosed` if the output already ended, or `Shutdown` if
    /// the dispatcher is gone.
    pub async fn watch(
        &self,
        pattern: &LinePattern,
        kind: WatchKind,
    ) -> Result<ArmedExchange, ExchangeError> {
        kind.validate(pattern)?;

        let (reply, rx) = oneshot::channel();
        let (ack, ack_rx) = oneshot::channel();
        self.control
            .send(Control::Register {
                pattern: pattern.clone(),
                kind,
                reply,
                ack,
            })
            .map_err(|_| ExchangeError::Shutdown)?;

        let id = ack_rx.await.map_err(|_| ExchangeError::Shutdown)??;
        let handle = ExchangeHandle::new(id, self.control.clone());
        Ok(ArmedExchange::new(handle, rx, Arc::clone(&self.sink)))
    }

    /// Register, send `command`, and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the `ExchangeError` the exchange terminated with.
    pub async fn run(&self, command: &str, pattern: &LinePattern, kind: WatchKind) -> ExchangeResult {
        self.watch(pattern, kind).await?.send(command)?.wait().await
    }

    /// Run a command and resolve with the first matching line.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Timeout` if nothing matches within `timeout`.
    pub async fn run_single(
        &self,
        command: &str,
        pattern: &LinePattern,
        timeout: Duration,
    ) -> ExchangeResult {
        self.run(command, pattern, WatchKind::Single(SingleOptions::new(timeout)))
            .await
    }

    /// Run a dump command and gather its lines until they stop coming.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Timeout` if no line matches within `timeout`,
    /// or `ExchangeError::Pattern` if `group_key` is not a group of `pattern`.
    pub async fn run_chunk(
        &self,
        command: &str,
        pattern: &LinePattern,
        group_key: &str,
        timeout: Duration,
        quiescence: Duration,
    ) -> ExchangeResult {
        let options = ChunkOptions::new(group_key, timeout, quiescence);
        self.run(command, pattern, WatchKind::Chunk(options)).await
    }

    /// Cancel an outstanding exchange. Idempotent.
    pub fn cancel(&self, handle: &ExchangeHandle) {
        handle.cancel();
    }

    /// Send a command without watching for a reply.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the command cannot be queued.
    pub fn send(&self, command: &str) -> Result<(), CommandError> {
        self.sink.send(command)
    }

    /// Number of watchers currently registered.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Shutdown` if the dispatcher is gone.
    pub async fn active_watchers(&self) -> Result<usize, ExchangeError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Count(tx))
            .map_err(|_| ExchangeError::Shutdown)?;
        rx.await.map_err(|_| ExchangeError::Shutdown)
    }
}
