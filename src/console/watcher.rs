//! Correlation state for one outstanding exchange.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::chunk::{ChunkOptions, ChunkProgress, EmptyDumpPolicy};
use super::error::{ExchangeError, PatternError};
use super::matcher::{LinePattern, MatchRecord};
use super::single::{SingleOptions, SingleProgress};

/// Outcome delivered to the caller of an exchange.
pub type ExchangeResult = Result<Vec<MatchRecord>, ExchangeError>;

/// Stand-in horizon for durations too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + after`, clamped to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Opaque watcher identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(pub(crate) u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Lifecycle state of a watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatcherState {
    #[default]
    Pending,
    Resolved,
    TimedOut,
    Cancelled,
    Closed,
}

impl WatcherState {
    /// Whether the watcher has left `Pending`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// Completion policy requested for a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchKind {
    Single(SingleOptions),
    Chunk(ChunkOptions),
}

impl WatchKind {
    /// The absolute timeout of the exchange.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Single(options) => options.timeout,
            Self::Chunk(options) => options.timeout,
        }
    }

    /// Check that the pattern declares every group this kind relies on.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::MissingGroup` for the first absent group.
    pub fn validate(&self, pattern: &LinePattern) -> Result<(), PatternError> {
        match self {
            Self::Single(options) => options
                .key
                .as_deref()
                .map_or(Ok(()), |key| pattern.require_group(key)),
            Self::Chunk(options) => pattern.require_group(&options.group_key),
        }
    }
}

/// Whether a watcher wants more lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Complete,
}

#[derive(Debug)]
enum Progress {
    Single(SingleProgress),
    Chunk(ChunkProgress),
}

/// Live correlation state: pattern, completion policy and gathered records.
#[derive(Debug)]
pub struct Watcher {
    id: WatcherId,
    pattern: LinePattern,
    progress: Progress,
    timeout: Duration,
    registered_at: Instant,
    state: WatcherState,
    records: Vec<MatchRecord>,
}

impl Watcher {
    pub(crate) fn new(id: WatcherId, pattern: LinePattern, kind: &WatchKind, now: Instant) -> Self {
        let progress = match kind {
            WatchKind::Single(options) => Progress::Single(SingleProgress::new(options)),
            WatchKind::Chunk(options) => Progress::Chunk(ChunkProgress::new(options)),
        };
        Self {
            id,
            pattern,
            progress,
            timeout: kind.timeout(),
            registered_at: now,
            state: WatcherState::Pending,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    #[must_use]
    pub fn pattern(&self) -> &LinePattern {
        &self.pattern
    }

    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.state
    }

    #[must_use]
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    /// Test a line against the pattern and feed any match to the policy.
    ///
    /// Lines offered after the watcher left `Pending` are ignored.
    pub(crate) fn offer(&mut self, line: &str, sequence: u64, now: Instant) -> Step {
        if self.state.is_terminal() {
            return Step::Complete;
        }
        let Some(record) = self.pattern.match_line(line, sequence) else {
            return Step::Continue;
        };

        match &mut self.progress {
            Progress::Single(progress) => progress.accept(record, &mut self.records),
            Progress::Chunk(progress) => progress.accept(record, &mut self.records, now),
        }
    }

    /// The earliest instant at which the watcher completes without new input.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        let ceiling = deadline_after(self.registered_at, self.timeout);
        match &self.progress {
            Progress::Single(_) => ceiling,
            Progress::Chunk(progress) => progress
                .quiescence_deadline()
                .map_or(ceiling, |quiet| quiet.min(ceiling)),
        }
    }

    /// Leave `Pending` with the gathered records.
    pub(crate) fn resolve(&mut self) -> ExchangeResult {
        self.transition(WatcherState::Resolved);
        let mut records = std::mem::take(&mut self.records);
        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    /// Leave `Pending` because the deadline passed.
    ///
    /// Records gathered so far still resolve the exchange; only an empty
    /// watcher times out, unless a chunk is configured to accept empty dumps.
    pub(crate) fn expire(&mut self, now: Instant) -> ExchangeResult {
        let empty_ok = matches!(
            &self.progress,
            Progress::Chunk(progress) if progress.empty_dump() == EmptyDumpPolicy::Resolve
        );
        if !self.records.is_empty() || empty_ok {
            return self.resolve();
        }

        self.transition(WatcherState::TimedOut);
        Err(ExchangeError::Timeout {
            pattern: self.pattern.as_str().to_string(),
            elapsed: now.saturating_duration_since(self.registered_at),
        })
    }

    /// Leave `Pending` without a result.
    pub(crate) fn abort(&mut self, error: ExchangeError) -> ExchangeResult {
        let state = match error {
            ExchangeError::Cancelled | ExchangeError::Command(_) | ExchangeError::Pattern(_) => {
                WatcherState::Cancelled
            }
            ExchangeError::Timeout { .. } => WatcherState::TimedOut,
            ExchangeError::StreamClosed | ExchangeError::Shutdown => WatcherState::Closed,
        };
        self.transition(state);
        self.records.clear();
        Err(error)
    }

    fn transition(&mut self, to: WatcherState) {
        debug_assert_eq!(self.state, WatcherState::Pending, "watcher resolved twice");
        tracing::debug!(
            id = %self.id,
            pattern = %self.pattern.as_str(),
            to = ?to,
            records = self.records.len(),
            "Watcher finished"
        );
        self.state = to;
    }
}
