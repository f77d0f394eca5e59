//! Console correlation engine.
//!
//! The engine console has no request ids: a command goes in and, some time
//! later, lines come out mixed with unrelated traffic. An exchange describes
//! what a valid reply looks like (a [`LinePattern`]) and how to tell when it
//! is complete (a [`WatchKind`]), and the dispatcher correlates output lines
//! to every outstanding exchange.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use brick_console::console::{Dispatcher, LinePattern};
//! use brick_console::engine::{EngineProcess, EngineProcessBuilder, LineNormalizer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = EngineProcess::spawn(
//!     &EngineProcessBuilder::new("server"),
//!     LineNormalizer::plain(),
//!     1024,
//! )?;
//! let (console, _dispatcher) =
//!     Dispatcher::spawn(engine.output().feed(), Arc::new(engine.commands()));
//!
//! let pattern = LinePattern::new(r"^(?<index>\d+)\) BP_PlayerState_C .+\.PlayerName = (?<name>.+)$")?;
//! let players = console
//!     .run_chunk(
//!         "GetAll BP_PlayerState_C PlayerName",
//!         &pattern,
//!         "index",
//!         Duration::from_secs(1),
//!         Duration::from_millis(100),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod chunk;
mod client;
mod dispatcher;
mod error;
mod exchange;
mod matcher;
mod registry;
mod single;
mod watcher;

pub use chunk::{ChunkOptions, EmptyDumpPolicy, RestartPolicy, DEFAULT_SENTINEL};
pub use client::Console;
pub use dispatcher::{Dispatcher, DispatcherHandle, LINE_BURST};
pub use error::{ExchangeError, PatternError};
pub use exchange::{ArmedExchange, ExchangeHandle, PendingExchange};
pub use matcher::{LinePattern, MatchRecord};
pub use registry::{Reply, WatcherRegistry};
pub use single::SingleOptions;
pub use watcher::{ExchangeResult, WatchKind, Watcher, WatcherId, WatcherState};
