//! Registry of active watchers.
//!
//! The registry exclusively owns every watcher for its whole life. A watcher
//! is removed the moment it leaves `Pending`, and its caller is answered
//! through the oneshot it registered with. The registry itself does no
//! locking; it is meant to live inside a single dispatcher task.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::ExchangeError;
use super::matcher::LinePattern;
use super::watcher::{ExchangeResult, Step, WatchKind, Watcher, WatcherId};

/// Channel end on which an exchange's outcome is delivered.
pub type Reply = oneshot::Sender<ExchangeResult>;

#[derive(Debug)]
struct Entry {
    watcher: Watcher,
    reply: Reply,
}

/// The set of watchers currently waiting on console output.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
    entries: HashMap<WatcherId, Entry>,
    next_id: u64,
    next_sequence: u64,
}

impl WatcherRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watcher; it sees every line dispatched from now on.
    pub fn register(
        &mut self,
        pattern: LinePattern,
        kind: &WatchKind,
        now: Instant,
        reply: Reply,
    ) -> WatcherId {
        let id = WatcherId(self.next_id);
        self.next_id += 1;

        tracing::debug!(
            id = %id,
            pattern = %pattern.as_str(),
            kind = ?kind,
            "Watcher registered"
        );
        let watcher = Watcher::new(id, pattern, kind, now);
        self.entries.insert(id, Entry { watcher, reply });
        id
    }

    /// Cancel a watcher. Unknown or already finished ids are ignored.
    ///
    /// Returns whether a pending watcher was removed.
    pub fn unregister(&mut self, id: WatcherId) -> bool {
        self.abort(id, ExchangeError::Cancelled)
    }

    /// Remove a watcher, failing its caller with `error`.
    pub fn abort(&mut self, id: WatcherId, error: ExchangeError) -> bool {
        let Some(mut entry) = self.entries.remove(&id) else {
            return false;
        };
        let outcome = entry.watcher.abort(error);
        Self::deliver(entry, outcome);
        true
    }

    /// Feed one line to every pending watcher.
    ///
    /// Lines are stamped with a registry-wide arrival sequence. Every
    /// watcher whose pattern matches gets its own record. Returns the number
    /// of watchers that matched.
    pub fn dispatch(&mut self, line: &str, now: Instant) -> usize {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut matched = 0;
        let mut completed = Vec::new();
        for (id, entry) in &mut self.entries {
            let before = entry.watcher.records().len();
            let step = entry.watcher.offer(line, sequence, now);
            if entry.watcher.records().len() != before || step == Step::Complete {
                matched += 1;
            }
            if step == Step::Complete {
                completed.push(*id);
            }
        }

        for id in completed {
            if let Some(mut entry) = self.entries.remove(&id) {
                let outcome = entry.watcher.resolve();
                Self::deliver(entry, outcome);
            }
        }

        if matched > 0 {
            tracing::trace!(sequence, matched, line = %line, "Line matched");
        }
        matched
    }

    /// Complete every watcher whose deadline is at or before `now`.
    ///
    /// Returns the number of watchers finished.
    pub fn expire(&mut self, now: Instant) -> usize {
        let due: Vec<WatcherId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.watcher.deadline() <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &due {
            if let Some(mut entry) = self.entries.remove(id) {
                let outcome = entry.watcher.expire(now);
                Self::deliver(entry, outcome);
            }
        }
        due.len()
    }

    /// Fail every pending watcher with `error`.
    pub fn close(&mut self, error: &ExchangeError) -> usize {
        let count = self.entries.len();
        if count > 0 {
            tracing::debug!(count, error = %error, "Failing all pending watchers");
        }
        for (_, mut entry) in self.entries.drain() {
            let outcome = entry.watcher.abort(error.clone());
            Self::deliver(entry, outcome);
        }
        count
    }

    /// Earliest deadline among pending watchers.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.watcher.deadline()).min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: WatcherId) -> bool {
        self.entries.contains_key(&id)
    }

    fn deliver(entry: Entry, outcome: ExchangeResult) {
        if entry.reply.send(outcome).is_err() {
            tracing::trace!(id = %entry.watcher.id(), "Exchange caller went away");
        }
    }
}
