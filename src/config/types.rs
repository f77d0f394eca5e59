//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::console::{
    ChunkOptions, EmptyDumpPolicy, PatternError, RestartPolicy, SingleOptions, DEFAULT_SENTINEL,
};
use crate::engine::{
    EngineProcessBuilder, LineNormalizer, DEFAULT_BROADCAST_CAPACITY, DEFAULT_LINE_PREFIX,
};

/// Default exchange timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Timeout of single exchanges, in milliseconds.
    pub single_timeout_ms: u64,
    /// Ceiling of chunk exchanges, in milliseconds.
    pub chunk_timeout_ms: u64,
    /// Silence that ends a dump, in milliseconds.
    pub quiescence_ms: u64,
    /// Value the dump key starts at.
    pub sentinel: String,
    /// Overlapping dump handling.
    pub restart: RestartPolicy,
    /// Handling of dumps that produce nothing.
    pub empty_dump: EmptyDumpPolicy,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            single_timeout_ms: 1000,
            chunk_timeout_ms: 2000,
            quiescence_ms: 100,
            sentinel: DEFAULT_SENTINEL.to_string(),
            restart: RestartPolicy::default(),
            empty_dump: EmptyDumpPolicy::default(),
        }
    }
}

impl ExchangeConfig {
    /// Single exchange options with the configured timeout.
    #[must_use]
    pub fn single_options(&self) -> SingleOptions {
        SingleOptions::new(Duration::from_millis(self.single_timeout_ms))
    }

    /// Chunk exchange options keyed by `group_key`, with the configured policies.
    #[must_use]
    pub fn chunk_options(&self, group_key: &str) -> ChunkOptions {
        ChunkOptions::new(
            group_key,
            Duration::from_millis(self.chunk_timeout_ms),
            Duration::from_millis(self.quiescence_ms),
        )
        .sentinel(self.sentinel.clone())
        .restart(self.restart)
        .empty_dump(self.empty_dump)
    }
}

/// Output stream handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    /// Regex removed from the start of every line before matching.
    pub line_prefix: Option<String>,
    /// Lines buffered per output subscriber.
    pub broadcast_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            line_prefix: Some(DEFAULT_LINE_PREFIX.to_string()),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl StreamConfig {
    /// Build the line normalizer.
    ///
    /// # Errors
    ///
    /// Returns `PatternError` if `line_prefix` is not a valid regex.
    pub fn normalizer(&self) -> Result<LineNormalizer, PatternError> {
        match self.line_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => LineNormalizer::with_prefix(prefix),
            _ => Ok(LineNormalizer::plain()),
        }
    }
}

/// How to start the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine binary.
    pub binary: String,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Working directory of the engine.
    pub working_dir: Option<PathBuf>,
    /// Grace period between SIGTERM and kill, in milliseconds.
    pub terminate_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "brickadia".to_string(),
            args: Vec::new(),
            working_dir: None,
            terminate_timeout_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Builder for the configured engine command line.
    #[must_use]
    pub fn builder(&self) -> EngineProcessBuilder {
        let builder = EngineProcessBuilder::new(&self.binary).args(self.args.iter().cloned());
        match &self.working_dir {
            Some(dir) => builder.working_dir(dir),
            None => builder,
        }
    }

    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub exchange: ExchangeConfig,
    pub stream: StreamConfig,
    pub engine: EngineConfig,
}
