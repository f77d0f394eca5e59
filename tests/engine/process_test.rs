//! End-to-end tests against a shell script standing in for the server.

use std::sync::Arc;
use std::time::Duration;

use brick_console::console::{Dispatcher, ExchangeError, LinePattern};
use brick_console::engine::{
    EngineProcess, EngineProcessBuilder, LineNormalizer, SpawnError, DEFAULT_LINE_PREFIX,
};

/// Echoes each command back as a prefixed log line, then answers `dump` with
/// three entries.
const FAKE_SERVER: &str = r#"
while read -r cmd; do
  if [ "$cmd" = "dump" ]; then
    printf '[2024.01.01-00.00.00:000][  1]0) first\r\n'
    printf '[2024.01.01-00.00.00:001][  1]1) second\r\n'
    printf '[2024.01.01-00.00.00:002][  1]2) third\r\n'
  else
    echo "[2024.01.01-00.00.00:000][  1]Echo: $cmd"
  fi
done
"#;

fn fake_server() -> EngineProcessBuilder {
    EngineProcessBuilder::new("sh").arg("-c").arg(FAKE_SERVER)
}

fn spawn_fake() -> EngineProcess {
    EngineProcess::spawn(
        &fake_server(),
        LineNormalizer::with_prefix(DEFAULT_LINE_PREFIX).unwrap(),
        64,
    )
    .unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn test_single_over_real_process() {
    let mut engine = spawn_fake();
    let (console, _dispatcher) =
        Dispatcher::spawn(engine.output().feed(), Arc::new(engine.commands()));

    let echo = LinePattern::new(r"^Echo: (?<text>.+)$").unwrap();
    let records = console
        .run_single("hello there", &echo, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(records[0].get("text"), Some("hello there"));
    assert_eq!(records[0].line, "Echo: hello there");

    engine
        .graceful_terminate(Duration::from_secs(2))
        .await
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_chunk_over_real_process() {
    let mut engine = spawn_fake();
    let (console, _dispatcher) =
        Dispatcher::spawn(engine.output().feed(), Arc::new(engine.commands()));

    let entry = LinePattern::new(r"^(?<index>\d+)\) (?<name>\w+)$").unwrap();
    let records = console
        .run_chunk(
            "dump",
            &entry,
            "index",
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
        .await
        .unwrap();

    let names: Vec<_> = records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["first", "second", "third"]);

    engine
        .graceful_terminate(Duration::from_secs(2))
        .await
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_exit_closes_stream() {
    let engine = EngineProcess::spawn(
        &EngineProcessBuilder::new("sh").arg("-c").arg("sleep 0.2"),
        LineNormalizer::plain(),
        64,
    )
    .unwrap();
    let (console, _dispatcher) =
        Dispatcher::spawn(engine.output().feed(), Arc::new(engine.commands()));

    let never = LinePattern::new("never").unwrap();
    let err = console
        .run_single("status", &never, Duration::from_secs(10))
        .await
        .unwrap_err();
    assert_eq!(err, ExchangeError::StreamClosed);
}

#[test]
fn test_spawn_missing_binary() {
    let result = tokio_test::block_on(async {
        EngineProcess::spawn(
            &EngineProcessBuilder::new("/nonexistent/brickadia-server"),
            LineNormalizer::plain(),
            64,
        )
    });
    assert!(matches!(result, Err(SpawnError::NotFound(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_terminate_kills_engine_ignoring_sigterm() {
    let mut engine = EngineProcess::spawn(
        &EngineProcessBuilder::new("sh")
            .arg("-c")
            .arg("trap '' TERM; while true; do sleep 1; done"),
        LineNormalizer::plain(),
        64,
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    engine
        .graceful_terminate(Duration::from_millis(200))
        .await
        .unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), engine.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(!status.success());
}

#[cfg(unix)]
#[tokio::test]
async fn test_terminate_after_exit_is_ok() {
    let mut engine = EngineProcess::spawn(
        &EngineProcessBuilder::new("sh").arg("-c").arg("exit 0"),
        LineNormalizer::plain(),
        64,
    )
    .unwrap();
    assert!(engine.wait().await.unwrap().success());

    engine
        .graceful_terminate(Duration::from_millis(100))
        .await
        .unwrap();
}
