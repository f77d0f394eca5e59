//! Single exchanges: resolve on the first match, or first match per key.

use std::collections::HashSet;
use std::time::Duration;

use super::matcher::MatchRecord;
use super::watcher::Step;

/// Options for a single exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOptions {
    /// Time to wait before giving up.
    pub timeout: Duration,
    /// Number of records required to resolve.
    pub count: usize,
    /// Capture group whose distinct values each count once.
    pub key: Option<String>,
}

impl SingleOptions {
    /// Resolve on the first matching line.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            count: 1,
            key: None,
        }
    }

    /// Require `count` records before resolving.
    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    /// Only keep the first match for each distinct value of `key`.
    #[must_use]
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug)]
pub(crate) struct SingleProgress {
    count: usize,
    key: Option<String>,
    seen: HashSet<String>,
}

impl SingleProgress {
    pub(crate) fn new(options: &SingleOptions) -> Self {
        Self {
            count: options.count.max(1),
            key: options.key.clone(),
            seen: HashSet::new(),
        }
    }

    pub(crate) fn accept(&mut self, record: MatchRecord, records: &mut Vec<MatchRecord>) -> Step {
        if let Some(key) = &self.key {
            // Records without the key cannot be told apart, drop them.
            let Some(value) = record.get(key) else {
                return Step::Continue;
            };
            if !self.seen.insert(value.to_string()) {
                tracing::trace!(key = %key, value = %value, "Duplicate keyed match ignored");
                return Step::Continue;
            }
        }

        records.push(record);
        if records.len() >= self.count {
            Step::Complete
        } else {
            Step::Continue
        }
    }
}
