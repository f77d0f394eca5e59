//! The dispatcher task.
//!
//! One task owns the output subscription and the watcher registry. Lines,
//! timer expiries, registrations and cancellations are handled one at a
//! time, so a watcher leaves `Pending` exactly once no matter which event
//! reaches it first.
//!
//! Event priority on every turn is shutdown, expired deadlines, output
//! lines, then control messages. Expiry before lines means a watcher whose
//! deadline has passed times out before it sees a line that arrived at the
//! same moment. Lines before control messages means queued output is drained
//! before a new watcher is registered, so a watcher only sees output that
//! arrived after it was registered. Under a continuous backlog, pending
//! control messages are still serviced after every [`LINE_BURST`] lines.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::client::Console;
use super::error::ExchangeError;
use super::matcher::LinePattern;
use super::registry::{Reply, WatcherRegistry};
use super::watcher::{WatchKind, WatcherId};
use crate::engine::CommandSink;

type LineStream = Pin<Box<dyn futures_core::Stream<Item = String> + Send>>;

/// Lines handled back to back before queued control messages get a turn.
pub const LINE_BURST: usize = 64;

/// Requests from consoles and exchange handles.
#[derive(Debug)]
pub(crate) enum Control {
    Register {
        pattern: LinePattern,
        kind: WatchKind,
        reply: Reply,
        ack: oneshot::Sender<Result<WatcherId, ExchangeError>>,
    },
    Cancel(WatcherId),
    Count(oneshot::Sender<usize>),
}

/// Owns the output subscription and the watcher registry.
pub struct Dispatcher {
    registry: WatcherRegistry,
    lines: LineStream,
    control: mpsc::UnboundedReceiver<Control>,
    shutdown: CancellationToken,
    closed: bool,
    burst: usize,
}

impl Dispatcher {
    /// Start a dispatcher over `lines`, sending triggers through `sink`.
    ///
    /// Returns the console used to issue exchanges and a handle to stop the
    /// task. The task ends on shutdown or once every console and exchange
    /// handle is dropped. Must be called from within a tokio runtime.
    pub fn spawn<S>(lines: S, sink: Arc<dyn CommandSink>) -> (Console, DispatcherHandle)
    where
        S: futures_core::Stream<Item = String> + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let dispatcher = Self {
            registry: WatcherRegistry::new(),
            lines: Box::pin(lines),
            control: control_rx,
            shutdown: shutdown.clone(),
            closed: false,
            burst: 0,
        };
        let task = tokio::spawn(dispatcher.run());

        (
            Console::new(control_tx, sink),
            DispatcherHandle { shutdown, task },
        )
    }

    async fn run(mut self) {
        tracing::debug!("Console dispatcher started");
        loop {
            if self.burst >= LINE_BURST && !self.drain_control() {
                break;
            }
            let deadline = self.registry.next_deadline();

            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    self.registry.close(&ExchangeError::Shutdown);
                    break;
                }
                () = sleep_until(deadline) => {
                    self.registry.expire(Instant::now());
                }
                line = self.lines.next(), if !self.closed => {
                    self.burst += 1;
                    self.handle_line(line);
                }
                message = self.control.recv() => {
                    let Some(message) = message else {
                        self.registry.close(&ExchangeError::Shutdown);
                        break;
                    };
                    self.burst = 0;
                    self.handle_control(message);
                }
            }
        }
        tracing::debug!("Console dispatcher stopped");
    }

    /// Handle every control message already queued.
    ///
    /// Returns `false` once every console and handle is gone.
    fn drain_control(&mut self) -> bool {
        self.burst = 0;
        loop {
            match self.control.try_recv() {
                Ok(message) => self.handle_control(message),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.registry.close(&ExchangeError::Shutdown);
                    return false;
                }
            }
        }
    }

    fn handle_line(&mut self, line: Option<String>) {
        let now = Instant::now();
        self.registry.expire(now);

        if let Some(line) = line {
            self.registry.dispatch(&line, now);
        } else {
            tracing::info!("Console output stream ended");
            self.closed = true;
            self.registry.close(&ExchangeError::StreamClosed);
        }
    }

    fn handle_control(&mut self, message: Control) {
        match message {
            Control::Register {
                pattern,
                kind,
                reply,
                ack,
            } => {
                if self.closed {
                    let _ = ack.send(Err(ExchangeError::StreamClosed));
                    return;
                }
                let id = self
                    .registry
                    .register(pattern, &kind, Instant::now(), reply);
                if ack.send(Ok(id)).is_err() {
                    // The caller stopped waiting for the ack; nobody can trigger it.
                    self.registry.unregister(id);
                }
            }
            Control::Cancel(id) => {
                if self.registry.unregister(id) {
                    tracing::debug!(id = %id, "Watcher cancelled");
                }
            }
            Control::Count(tx) => {
                let _ = tx.send(self.registry.len());
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running dispatcher task.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop the dispatcher; pending exchanges fail with `Shutdown`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the dispatcher task to end.
    ///
    /// # Errors
    ///
    /// Returns the `JoinError` if the task panicked or was aborted.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}
