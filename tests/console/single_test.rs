//! Single exchange tests.

use std::time::Duration;

use brick_console::console::{ExchangeError, SingleOptions, WatchKind};
use tokio::time::Instant;

use super::{emit_after, harness, pattern, settle};

#[tokio::test(start_paused = true)]
async fn test_single_resolves_on_first_match() {
    let h = harness();
    let value = pattern(r"^Value: (?<value>\d+)$");

    let start = Instant::now();
    emit_after(&h.lines, 5, "LogTemp: unrelated");
    emit_after(&h.lines, 10, "Value: 42");

    let records = h
        .console
        .run_single("GetValue", &value, Duration::from_millis(100))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_millis(15));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("value"), Some("42"));
    assert_eq!(records[0].line, "Value: 42");
    assert_eq!(h.sink.sent(), vec!["GetValue"]);
    assert_eq!(h.console.active_watchers().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_times_out_without_match() {
    let h = harness();
    let value = pattern(r"^Value: (?<v>\d+)$");

    let start = Instant::now();
    let err = h
        .console
        .run_single("GetValue", &value, Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(start.elapsed() < Duration::from_millis(52));
    match err {
        ExchangeError::Timeout { pattern, elapsed } => {
            assert_eq!(pattern, r"^Value: (?<v>\d+)$");
            assert!(elapsed >= Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(h.console.active_watchers().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_line_emitted_before_registration_is_not_seen() {
    let h = harness();
    let value = pattern(r"^Value: (?<v>\d+)$");

    h.lines.send("Value: 1".to_string()).unwrap();
    settle().await;

    emit_after(&h.lines, 5, "Value: 2");
    let records = h
        .console
        .run_single("GetValue", &value, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(records[0].get("v"), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn test_counted_single_dedups_by_key() {
    let h = harness();
    let joined = pattern(r"^Join: (?<name>\w+)$");
    let kind = WatchKind::Single(
        SingleOptions::new(Duration::from_millis(200))
            .count(2)
            .keyed("name"),
    );

    emit_after(&h.lines, 1, "Join: alice");
    emit_after(&h.lines, 2, "Join: alice");
    emit_after(&h.lines, 3, "Join: bob");
    emit_after(&h.lines, 4, "Join: carol");

    let records = h.console.run("ListJoins", &joined, kind).await.unwrap();
    let names: Vec<_> = records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test(start_paused = true)]
async fn test_counted_single_resolves_partial_on_timeout() {
    let h = harness();
    let joined = pattern(r"^Join: (?<name>\w+)$");
    let kind = WatchKind::Single(SingleOptions::new(Duration::from_millis(50)).count(3));

    emit_after(&h.lines, 10, "Join: alice");

    let start = Instant::now();
    let records = h.console.run("ListJoins", &joined, kind).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(records.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_exchanges_route_independently() {
    let h = harness();
    let health = pattern(r"^Health: (?<hp>\d+)$");
    let ping = pattern(r"^Ping: (?<ms>\d+)$");

    emit_after(&h.lines, 5, "Ping: 33");
    emit_after(&h.lines, 8, "Health: 90");

    let (health_result, ping_result) = tokio::join!(
        h.console
            .run_single("GetHealth", &health, Duration::from_millis(100)),
        h.console.run_single("GetPing", &ping, Duration::from_millis(100)),
    );

    assert_eq!(health_result.unwrap()[0].get("hp"), Some("90"));
    assert_eq!(ping_result.unwrap()[0].get("ms"), Some("33"));
    assert_eq!(h.sink.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_one_line_feeds_every_matching_watcher() {
    let h = harness();
    let any_value = pattern(r"^Value: (?<v>\d+)$");
    let digits = pattern(r"(?<d>\d+)");

    emit_after(&h.lines, 5, "Value: 7");

    let (a, b) = tokio::join!(
        h.console
            .run_single("A", &any_value, Duration::from_millis(100)),
        h.console.run_single("B", &digits, Duration::from_millis(100)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a[0].sequence, b[0].sequence);
    assert_eq!(b[0].get("d"), Some("7"));
}
