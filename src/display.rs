//! Colored CLI display for exchange results.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::console::{ExchangeError, MatchRecord};
use crate::queries::Roster;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let head: String = s.chars().take(max_len - 3).collect();
    format!("{head}...")
}

/// Format captured groups as `name=value` pairs.
#[must_use]
pub fn format_groups(record: &MatchRecord, raw_mode: bool) -> String {
    record
        .groups
        .iter()
        .map(|(k, v)| format!("{k}={}", truncate(v, 40, raw_mode)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Print the command being sent.
pub fn print_command(command: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[SEND]".blue().bold(),
        command.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print the records an exchange resolved with.
pub fn print_records(records: &[MatchRecord], raw_mode: bool) {
    let ts = timestamp();
    if records.is_empty() {
        println!("{} {} no lines", ts.dimmed(), "[MATCH]".yellow().bold());
    }
    for record in records {
        let dump = if record.dump > 0 {
            format!(" dump={}", record.dump)
        } else {
            String::new()
        };
        println!(
            "{} {} #{}{} {}",
            ts.dimmed(),
            "[MATCH]".green().bold(),
            record.sequence,
            dump.dimmed(),
            format_groups(record, raw_mode)
        );
        if raw_mode {
            println!("    {}", record.line.dimmed());
        } else {
            println!("    {}", truncate(&record.line, DEFAULT_MAX_LEN, false).dimmed());
        }
    }
    let _ = io::stdout().flush();
}

/// Print player names.
pub fn print_roster(roster: &Roster) {
    let ts = timestamp();
    println!(
        "{} {} {} online",
        ts.dimmed(),
        "[PLAYERS]".magenta().bold(),
        roster.len()
    );
    for player in &roster.players {
        println!("    {}", player.name.bold());
    }
    let _ = io::stdout().flush();
}

/// Print an exchange failure.
pub fn print_exchange_error(error: &ExchangeError) {
    let tag = if error.is_timeout() {
        "[TIMEOUT]".yellow().bold().to_string()
    } else {
        "[ERROR]".red().bold().to_string()
    };
    println!("{} {} {}", timestamp().dimmed(), tag, error);
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}
