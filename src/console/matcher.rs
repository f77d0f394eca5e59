//! Line matching against named-group patterns.
//!
//! A [`LinePattern`] turns one console line into a [`MatchRecord`] holding
//! the values of its named capture groups, or rejects it.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::PatternError;

/// A compiled regular expression matched against whole console lines.
///
/// Cloning is cheap; the compiled program is shared.
#[derive(Debug, Clone)]
pub struct LinePattern {
    regex: Regex,
    groups: Vec<String>,
}

impl LinePattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::InvalidRegex` if the expression does not compile.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self::from_regex(Regex::new(pattern)?))
    }

    /// Wrap an already compiled regex.
    #[must_use]
    pub fn from_regex(regex: Regex) -> Self {
        let groups = regex.capture_names().flatten().map(String::from).collect();
        Self { regex, groups }
    }

    /// The pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Names of the pattern's capture groups, in declaration order.
    #[must_use]
    pub fn group_names(&self) -> &[String] {
        &self.groups
    }

    /// Whether the pattern declares a capture group with this name.
    #[must_use]
    pub fn has_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    /// Check that the pattern declares `group`.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::MissingGroup` when it does not.
    pub fn require_group(&self, group: &str) -> Result<(), PatternError> {
        if self.has_group(group) {
            Ok(())
        } else {
            Err(PatternError::MissingGroup {
                pattern: self.as_str().to_string(),
                group: group.to_string(),
            })
        }
    }

    /// Match a line, producing the captured fields.
    ///
    /// A pattern with named groups only matches when at least one of them
    /// participates; groups that did not participate are absent from the
    /// result.
    #[must_use]
    pub fn captures(&self, line: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(line)?;
        let groups: BTreeMap<String, String> = self
            .groups
            .iter()
            .filter_map(|name| caps.name(name).map(|m| (name.clone(), m.as_str().to_string())))
            .collect();

        if groups.is_empty() && !self.groups.is_empty() {
            return None;
        }
        Some(groups)
    }

    /// Match a line and build a record stamped with its arrival sequence.
    #[must_use]
    pub fn match_line(&self, line: &str, sequence: u64) -> Option<MatchRecord> {
        self.captures(line).map(|groups| MatchRecord {
            groups,
            sequence,
            line: line.to_string(),
            dump: 0,
        })
    }
}

/// One matched console line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Captured values by group name.
    pub groups: BTreeMap<String, String>,
    /// Arrival index of the line on the output stream.
    pub sequence: u64,
    /// The matched line.
    pub line: String,
    /// Which dump range of a chunk exchange this record belongs to.
    #[serde(default)]
    pub dump: u32,
}

impl MatchRecord {
    /// Get a captured value.
    #[must_use]
    pub fn get(&self, group: &str) -> Option<&str> {
        self.groups.get(group).map(String::as_str)
    }
}
