//! Console exchange error types.

use std::time::Duration;

use crate::engine::CommandError;

/// Errors that can occur while compiling a line pattern.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    /// The regular expression did not compile.
    #[error("Invalid line pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// A chunk or keyed exchange named a capture group the pattern lacks.
    #[error("Pattern {pattern} has no capture group named {group}")]
    MissingGroup {
        /// The pattern source.
        pattern: String,
        /// The missing group name.
        group: String,
    },
}

/// Errors that terminate an exchange without a result.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// No satisfying match arrived within the timeout.
    #[error("Timed out after {}ms waiting for {pattern}", elapsed.as_millis())]
    Timeout {
        /// The pattern source that was being watched.
        pattern: String,
        /// Time between registration and expiry.
        elapsed: Duration,
    },

    /// The engine output stream ended.
    #[error("Console output stream closed")]
    StreamClosed,

    /// The exchange was cancelled before it resolved.
    #[error("Exchange cancelled")]
    Cancelled,

    /// The dispatcher was shut down.
    #[error("Console dispatcher shut down")]
    Shutdown,

    /// The triggering command could not be written.
    #[error("Command failed: {0}")]
    Command(#[from] CommandError),

    /// The pattern cannot serve the requested exchange.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl ExchangeError {
    /// Whether this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
