//! Feature-level queries built on console exchanges.
//!
//! At the console layer a timeout is only "no matching line arrived". Here,
//! where the meaning of a query is known, it is turned into an answer:
//! usually "unknown" or "not found".

use std::sync::LazyLock;

use serde::Serialize;

use crate::config::ExchangeConfig;
use crate::console::{
    Console, ExchangeError, ExchangeResult, LinePattern, MatchRecord, PatternError, WatchKind,
};

/// Command dumping every player state's name.
pub const PLAYER_NAMES_COMMAND: &str = "GetAll BP_PlayerState_C PlayerName";

static PLAYER_NAME_PATTERN: LazyLock<Result<LinePattern, PatternError>> = LazyLock::new(|| {
    LinePattern::new(
        r"^(?<index>\d+)\) BP_PlayerState_C (?<state>\S+)\.PlayerName = (?<name>.*)$",
    )
});

fn compiled(
    pattern: &'static LazyLock<Result<LinePattern, PatternError>>,
) -> Result<&'static LinePattern, ExchangeError> {
    pattern
        .as_ref()
        .map_err(|e| ExchangeError::Pattern(e.clone()))
}

/// Interpret a timeout as an absent result.
pub trait ExchangeResultExt {
    /// `Ok(None)` on timeout, the records otherwise.
    ///
    /// # Errors
    ///
    /// Passes through every error other than a timeout.
    fn found(self) -> Result<Option<Vec<MatchRecord>>, ExchangeError>;
}

impl ExchangeResultExt for ExchangeResult {
    fn found(self) -> Result<Option<Vec<MatchRecord>>, ExchangeError> {
        match self {
            Ok(records) => Ok(Some(records)),
            Err(e) if e.is_timeout() => {
                tracing::debug!(error = %e, "Query unanswered, treating as not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// One connected player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerEntry {
    /// Display name.
    pub name: String,
    /// Object path of the player's state actor.
    pub state: String,
}

/// Players reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub players: Vec<PlayerEntry>,
}

impl Roster {
    fn from_records(records: &[MatchRecord]) -> Self {
        let players = records
            .iter()
            .filter_map(|record| {
                Some(PlayerEntry {
                    name: record.get("name")?.to_string(),
                    state: record.get("state")?.to_string(),
                })
            })
            .collect();
        Self { players }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Names in dump order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.name.as_str()).collect()
    }
}

/// List connected players.
///
/// An unanswered dump is an empty server.
///
/// # Errors
///
/// Returns `ExchangeError::Pattern` if the dump pattern does not compile, and
/// any other console failure except a timeout.
pub async fn player_names(console: &Console, config: &ExchangeConfig) -> Result<Roster, ExchangeError> {
    let pattern = compiled(&PLAYER_NAME_PATTERN)?;
    let kind = WatchKind::Chunk(config.chunk_options("index"));
    let records = console
        .run(PLAYER_NAMES_COMMAND, pattern, kind)
        .await
        .found()?
        .unwrap_or_default();
    Ok(Roster::from_records(&records))
}
