//! Caller-side halves of an exchange.
//!
//! Registration and triggering are split into two types. [`ArmedExchange`]
//! exists only once the dispatcher has acknowledged the watcher, and it is
//! the only way to issue the triggering command, so a reply can never beat
//! its listener. Dropping either half before it resolves cancels the
//! watcher.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::dispatcher::Control;
use super::error::ExchangeError;
use super::watcher::{ExchangeResult, WatcherId};
use crate::engine::{CommandError, CommandSink};

/// Weak correlation handle used to cancel an exchange.
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    id: WatcherId,
    control: mpsc::UnboundedSender<Control>,
}

impl ExchangeHandle {
    pub(crate) fn new(id: WatcherId, control: mpsc::UnboundedSender<Control>) -> Self {
        Self { id, control }
    }

    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Cancel the exchange. Idempotent; a finished exchange is unaffected.
    pub fn cancel(&self) {
        let _ = self.control.send(Control::Cancel(self.id));
    }
}

/// Cancels the watcher on drop unless disarmed.
#[derive(Debug)]
struct CancelGuard {
    handle: ExchangeHandle,
    armed: bool,
}

impl CancelGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::trace!(id = %self.handle.id, "Exchange dropped before resolving");
            self.handle.cancel();
        }
    }
}

/// A registered watcher whose command has not been sent yet.
pub struct ArmedExchange {
    guard: CancelGuard,
    rx: oneshot::Receiver<ExchangeResult>,
    sink: Arc<dyn CommandSink>,
}

impl std::fmt::Debug for ArmedExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmedExchange")
            .field("id", &self.guard.handle.id)
            .finish_non_exhaustive()
    }
}

impl ArmedExchange {
    pub(crate) fn new(
        handle: ExchangeHandle,
        rx: oneshot::Receiver<ExchangeResult>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            guard: CancelGuard {
                handle,
                armed: true,
            },
            rx,
            sink,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &ExchangeHandle {
        &self.guard.handle
    }

    /// Run `exec` exactly once to produce the reply, then start waiting.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Command` if `exec` fails; the watcher is
    /// cancelled first.
    pub fn trigger<F>(self, exec: F) -> Result<PendingExchange, ExchangeError>
    where
        F: FnOnce(&dyn CommandSink) -> Result<(), CommandError>,
    {
        let Self { guard, rx, sink } = self;
        exec(sink.as_ref())?;
        Ok(PendingExchange { guard, rx })
    }

    /// Send `command` as the trigger.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Command` if the command cannot be sent.
    pub fn send(self, command: &str) -> Result<PendingExchange, ExchangeError> {
        self.trigger(|sink| sink.send(command))
    }
}

/// A triggered exchange waiting for its outcome.
#[derive(Debug)]
pub struct PendingExchange {
    guard: CancelGuard,
    rx: oneshot::Receiver<ExchangeResult>,
}

impl PendingExchange {
    #[must_use]
    pub fn handle(&self) -> &ExchangeHandle {
        &self.guard.handle
    }

    /// Wait for the watcher to resolve, time out or be cancelled.
    ///
    /// Dropping the returned future cancels the exchange.
    ///
    /// # Errors
    ///
    /// Returns the `ExchangeError` the watcher terminated with.
    pub async fn wait(mut self) -> ExchangeResult {
        let outcome = (&mut self.rx).await;
        self.guard.disarm();
        outcome.unwrap_or(Err(ExchangeError::Shutdown))
    }
}
