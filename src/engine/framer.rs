//! Line framing for raw engine output.
//!
//! Output arrives as bytes in arbitrary chunks. The framer yields complete
//! lines: CR/LF endings removed, invalid UTF-8 replaced, an optional log
//! prefix stripped, and a trailing unterminated line flushed at EOF.

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::console::PatternError;

/// Default prefix of engine log lines, e.g. `[2024.01.02-03.04.05:678][ 12]`.
pub const DEFAULT_LINE_PREFIX: &str = r"^\[\d{4}\.\d{2}\.\d{2}-\d{2}\.\d{2}\.\d{2}:\d{3}\]\[\s*\d+\]";

/// Normalizes raw lines before they reach the watchers.
#[derive(Debug, Clone, Default)]
pub struct LineNormalizer {
    prefix: Option<Regex>,
}

impl LineNormalizer {
    /// Normalizer that strips the given prefix pattern.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::InvalidRegex` if the prefix does not compile.
    pub fn with_prefix(prefix: &str) -> Result<Self, PatternError> {
        Ok(Self {
            prefix: Some(Regex::new(prefix)?),
        })
    }

    /// Normalizer that only trims line endings.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Normalize one raw line (without its `\n`).
    #[must_use]
    pub fn normalize(&self, raw: &[u8]) -> String {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        match &self.prefix {
            Some(prefix) => prefix.replace(&line, "").into_owned(),
            None => line.into_owned(),
        }
    }
}

/// Reads complete lines from engine output.
pub struct LineFramer<R> {
    reader: BufReader<R>,
    normalizer: LineNormalizer,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    #[must_use]
    pub fn new(reader: R, normalizer: LineNormalizer) -> Self {
        Self {
            reader: BufReader::new(reader),
            normalizer,
            buf: Vec::new(),
        }
    }

    /// Read the next complete line.
    ///
    /// Returns `Ok(None)` at end of output.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }
        let raw = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
        Ok(Some(self.normalizer.normalize(raw)))
    }

    /// Turn the framer into a stream of lines, ending at EOF or read error.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = String>
    where
        R: Send + 'static,
    {
        futures_util::stream::unfold(self, |mut framer| async move {
            match framer.next_line().await {
                Ok(Some(line)) => Some((line, framer)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Engine output read failed, ending stream");
                    None
                }
            }
        })
    }
}
