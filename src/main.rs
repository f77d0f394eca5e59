//! Brick Console - run watched commands against a game server console.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use brick_console::config::{ConfigError, ConfigLoader, ConsoleConfig};
use brick_console::console::{
    Console, Dispatcher, ExchangeError, LinePattern, PatternError, SingleOptions, WatchKind,
};
use brick_console::display;
use brick_console::engine::{EngineProcess, SpawnError};
use brick_console::queries;

#[derive(Parser)]
#[command(
    name = "brick-console",
    about = "Request/response exchanges over a game server console",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine binary, overriding the config file.
    #[arg(long)]
    engine: Option<String>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Do not truncate long lines.
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a command and wait for matching line(s).
    Single {
        /// Console command to send.
        #[arg(short, long)]
        command: String,
        /// Regex a reply line must match.
        #[arg(short, long)]
        pattern: String,
        /// Override the configured timeout.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Number of matches to wait for.
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Only count one match per value of this group.
        #[arg(long)]
        key: Option<String>,
    },
    /// Send a dump command and gather its lines.
    Chunk {
        /// Console command to send.
        #[arg(short, long)]
        command: String,
        /// Regex every dump line must match.
        #[arg(short, long)]
        pattern: String,
        /// Group holding the dump index.
        #[arg(short, long)]
        key: String,
        /// Override the configured ceiling.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Override the configured quiescence window.
        #[arg(long)]
        quiescence_ms: Option<u64>,
    },
    /// List connected players.
    Players,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<ConsoleConfig, ConfigError> {
    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load()?;
    if let Some(binary) = &cli.engine {
        config.engine.binary.clone_from(binary);
    }
    Ok(config)
}

fn emit_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(cli: &Cli, config: &ConsoleConfig, console: &Console) -> Result<(), CliError> {
    match &cli.command {
        Commands::Single {
            command,
            pattern,
            timeout_ms,
            count,
            key,
        } => {
            let pattern = LinePattern::new(pattern)?;
            let mut options = timeout_ms.map_or_else(
                || config.exchange.single_options(),
                |ms| SingleOptions::new(Duration::from_millis(ms)),
            );
            options = options.count(*count);
            if let Some(key) = key {
                options = options.keyed(key.clone());
            }
            run_records(cli, console, command, &pattern, WatchKind::Single(options)).await
        }
        Commands::Chunk {
            command,
            pattern,
            key,
            timeout_ms,
            quiescence_ms,
        } => {
            let pattern = LinePattern::new(pattern)?;
            let mut options = config.exchange.chunk_options(key);
            if let Some(ms) = timeout_ms {
                options.timeout = Duration::from_millis(*ms);
            }
            if let Some(ms) = quiescence_ms {
                options.quiescence = Duration::from_millis(*ms);
            }
            run_records(cli, console, command, &pattern, WatchKind::Chunk(options)).await
        }
        Commands::Players => {
            if !cli.json {
                display::print_command(queries::PLAYER_NAMES_COMMAND);
            }
            let roster = queries::player_names(console, &config.exchange).await?;
            if cli.json {
                emit_json(&roster)
            } else {
                display::print_roster(&roster);
                Ok(())
            }
        }
    }
}

async fn run_records(
    cli: &Cli,
    console: &Console,
    command: &str,
    pattern: &LinePattern,
    kind: WatchKind,
) -> Result<(), CliError> {
    if !cli.json {
        display::print_command(command);
    }
    let records = console.run(command, pattern, kind).await?;
    if cli.json {
        emit_json(&records)
    } else {
        display::print_records(&records, cli.raw);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let engine = config
        .stream
        .normalizer()
        .map_err(CliError::from)
        .and_then(|normalizer| {
            EngineProcess::spawn(
                &config.engine.builder(),
                normalizer,
                config.stream.broadcast_capacity,
            )
            .map_err(CliError::from)
        });
    let mut engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let (console, dispatcher) =
        Dispatcher::spawn(engine.output().feed(), Arc::new(engine.commands()));
    tracing::info!(binary = %config.engine.binary, "Console attached");

    let result = execute(&cli, &config, &console).await;

    dispatcher.shutdown();
    if let Err(e) = dispatcher.join().await {
        tracing::warn!(error = %e, "Dispatcher task failed");
    }
    if let Err(e) = engine
        .graceful_terminate(config.engine.terminate_timeout())
        .await
    {
        tracing::warn!(error = %e, "Failed to stop engine");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Exchange(e)) => {
            display::print_exchange_error(&e);
            ExitCode::FAILURE
        }
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
