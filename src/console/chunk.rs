//! Chunk exchanges: gather a bulk dump until it goes quiet.
//!
//! The engine answers an introspection command with zero or more lines and
//! no terminator. A chunk watcher keeps every matching line and resolves
//! once no new match has arrived for the quiescence window, or when the
//! absolute timeout is reached.
//!
//! Each dump numbers its entries through a key group that restarts at a
//! known sentinel. Seeing the sentinel again while records are held means a
//! second dump of the same command is overlapping ours; [`RestartPolicy`]
//! decides what happens then.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::matcher::MatchRecord;
use super::watcher::{deadline_after, Step};

/// Default value the dump key starts at.
pub const DEFAULT_SENTINEL: &str = "0";

/// What to do when a new dump starts while one is being gathered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Drop the partial dump and gather the new one.
    #[default]
    DiscardPrevious,
    /// Keep both dumps, numbered through `MatchRecord::dump`.
    KeepBoth,
    /// Resolve with the dump gathered so far and ignore the new one.
    FinishCurrent,
}

/// What to do when the timeout elapses without a single match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyDumpPolicy {
    /// Fail with `ExchangeError::Timeout`.
    #[default]
    Fail,
    /// Resolve with an empty list.
    Resolve,
}

/// Options for a chunk exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Capture group carrying the per-dump entry index.
    pub group_key: String,
    /// Value of `group_key` on the first entry of every dump.
    pub sentinel: String,
    /// Absolute ceiling on the exchange.
    pub timeout: Duration,
    /// Silence after the last match that ends the dump.
    pub quiescence: Duration,
    /// Overlapping dump handling.
    pub restart: RestartPolicy,
    /// Handling of a dump that never produced a line.
    pub empty_dump: EmptyDumpPolicy,
}

impl ChunkOptions {
    /// Create options with the default sentinel and policies.
    #[must_use]
    pub fn new(group_key: impl Into<String>, timeout: Duration, quiescence: Duration) -> Self {
        Self {
            group_key: group_key.into(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            timeout,
            quiescence,
            restart: RestartPolicy::default(),
            empty_dump: EmptyDumpPolicy::default(),
        }
    }

    /// Set the value the dump key restarts at.
    #[must_use]
    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Set the overlapping dump policy.
    #[must_use]
    pub fn restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Set the empty dump policy.
    #[must_use]
    pub fn empty_dump(mut self, empty_dump: EmptyDumpPolicy) -> Self {
        self.empty_dump = empty_dump;
        self
    }
}

#[derive(Debug)]
pub(crate) struct ChunkProgress {
    group_key: String,
    sentinel: String,
    quiescence: Duration,
    restart: RestartPolicy,
    empty_dump: EmptyDumpPolicy,
    last_activity: Option<Instant>,
    dump: u32,
}

impl ChunkProgress {
    pub(crate) fn new(options: &ChunkOptions) -> Self {
        Self {
            group_key: options.group_key.clone(),
            sentinel: options.sentinel.clone(),
            quiescence: options.quiescence,
            restart: options.restart,
            empty_dump: options.empty_dump,
            last_activity: None,
            dump: 0,
        }
    }

    pub(crate) fn accept(
        &mut self,
        mut record: MatchRecord,
        records: &mut Vec<MatchRecord>,
        now: Instant,
    ) -> Step {
        let restarted =
            !records.is_empty() && record.get(&self.group_key) == Some(self.sentinel.as_str());

        if restarted {
            match self.restart {
                RestartPolicy::DiscardPrevious => {
                    tracing::debug!(
                        discarded = records.len(),
                        "New dump started, discarding partial chunk"
                    );
                    records.clear();
                    self.dump += 1;
                }
                RestartPolicy::KeepBoth => {
                    self.dump += 1;
                }
                RestartPolicy::FinishCurrent => {
                    tracing::debug!(kept = records.len(), "New dump started, finishing chunk");
                    return Step::Complete;
                }
            }
        }

        record.dump = self.dump;
        records.push(record);
        self.last_activity = Some(now);
        Step::Continue
    }

    /// When the dump is considered finished for lack of activity.
    pub(crate) fn quiescence_deadline(&self) -> Option<Instant> {
        self.last_activity
            .map(|at| deadline_after(at, self.quiescence))
    }

    pub(crate) fn empty_dump(&self) -> EmptyDumpPolicy {
        self.empty_dump
    }
}
