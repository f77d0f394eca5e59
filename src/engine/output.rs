//! Broadcast of engine output lines to every subscriber.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

/// Default number of lines buffered per subscriber.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Outlets {
    broadcast: broadcast::Sender<String>,
    feeds: Vec<mpsc::UnboundedSender<String>>,
}

/// Fan-out of engine output in arrival order.
///
/// Two kinds of reader are served. A [`feed`](Self::feed) receives every
/// line and is what the console dispatcher reads from. A
/// [`subscribe`](Self::subscribe) reader shares a bounded broadcast and may
/// skip lines when it falls behind.
///
/// Clones share the same outlets. Once the output is closed, every reader
/// ends after draining its buffered lines, and new readers end immediately.
#[derive(Debug, Clone)]
pub struct OutputStream {
    outlets: Arc<Mutex<Option<Outlets>>>,
}

impl OutputStream {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (broadcast, _) = broadcast::channel(capacity.max(1));
        Self {
            outlets: Arc::new(Mutex::new(Some(Outlets {
                broadcast,
                feeds: Vec::new(),
            }))),
        }
    }

    fn sender(&self) -> Option<broadcast::Sender<String>> {
        self.outlets
            .lock()
            .ok()
            .and_then(|outlets| outlets.as_ref().map(|o| o.broadcast.clone()))
    }

    /// Publish one line. Lines published with no reader are dropped.
    pub fn publish(&self, line: String) {
        let Ok(mut guard) = self.outlets.lock() else {
            return;
        };
        let Some(outlets) = guard.as_mut() else {
            return;
        };
        outlets.feeds.retain(|feed| feed.send(line.clone()).is_ok());
        let _ = outlets.broadcast.send(line);
    }

    /// End the output for every reader.
    pub fn close(&self) {
        if let Ok(mut guard) = self.outlets.lock() {
            if guard.take().is_some() {
                tracing::debug!("Engine output closed");
            }
        }
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outlets.lock().map_or(true, |outlets| outlets.is_none())
    }

    /// Receive every line published from now on, without loss.
    ///
    /// Lines queue without bound until read, so a slow reader costs memory
    /// instead of lines.
    pub fn feed(&self) -> impl futures_core::Stream<Item = String> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut guard) = self.outlets.lock() {
            if let Some(outlets) = guard.as_mut() {
                outlets.feeds.push(tx);
            }
        }
        // A feed taken after close holds no sender and ends at once.
        UnboundedReceiverStream::new(rx)
    }

    /// Subscribe to lines published from now on.
    ///
    /// A subscriber that falls behind by more than the capacity skips the
    /// lost lines and logs how many were dropped. Use [`feed`](Self::feed)
    /// where every line matters.
    pub fn subscribe(&self) -> impl futures_core::Stream<Item = String> + Send + 'static {
        let rx = self.sender().map(|tx| tx.subscribe());
        // Subscribing after close yields an already ended stream.
        let stream = futures_util::stream::iter(rx).flat_map(BroadcastStream::new);
        stream.filter_map(|item| async move {
            match item {
                Ok(line) => Some(line),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output subscriber lagged, lines dropped");
                    None
                }
            }
        })
    }

    /// Number of live readers, feeds included.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.outlets.lock().ok().map_or(0, |guard| {
            guard.as_ref().map_or(0, |outlets| {
                let feeds = outlets.feeds.iter().filter(|f| !f.is_closed()).count();
                outlets.broadcast.receiver_count() + feeds
            })
        })
    }

    /// Publish every line of `lines`, then close the output.
    pub async fn pump<S>(self, lines: S)
    where
        S: futures_core::Stream<Item = String>,
    {
        futures_util::pin_mut!(lines);
        while let Some(line) = lines.next().await {
            self.publish(line);
        }
        self.close();
    }
}

impl Default for OutputStream {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}
