//! Chunk exchange tests.

use std::sync::Arc;
use std::time::Duration;

use brick_console::console::{
    ChunkOptions, Dispatcher, EmptyDumpPolicy, ExchangeError, RestartPolicy, WatchKind,
};
use brick_console::engine::{OutputStream, RecordingSink};
use tokio::time::Instant;

use super::{emit_after, harness, pattern};

const ENTRY: &str = r"^(?<index>\d+)\) (?<name>\w+)$";

fn chunk(timeout_ms: u64, quiet_ms: u64) -> ChunkOptions {
    ChunkOptions::new(
        "index",
        Duration::from_millis(timeout_ms),
        Duration::from_millis(quiet_ms),
    )
}

#[tokio::test(start_paused = true)]
async fn test_chunk_resolves_after_quiescence() {
    let h = harness();
    let entry = pattern(ENTRY);

    let armed = h
        .console
        .watch(&entry, WatchKind::Chunk(chunk(500, 20)))
        .await
        .unwrap();
    let start = Instant::now();
    emit_after(&h.lines, 0, "0) alpha");
    emit_after(&h.lines, 5, "1) beta");
    emit_after(&h.lines, 10, "2) gamma");

    let records = armed.send("GetAll Thing Name").unwrap().wait().await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(30), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(32), "{elapsed:?}");
    let names: Vec<_> = records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    assert!(records.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[tokio::test(start_paused = true)]
async fn test_chunk_ignores_interleaved_noise() {
    let h = harness();
    let entry = pattern(ENTRY);

    emit_after(&h.lines, 1, "0) alpha");
    emit_after(&h.lines, 2, "LogNet: player connected");
    emit_after(&h.lines, 3, "1) beta");

    let records = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(chunk(500, 20)))
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_ceiling_bounds_a_steady_dump() {
    let h = harness();
    let entry = pattern(ENTRY);

    for i in 0..20u64 {
        emit_after(&h.lines, i * 10, &format!("{}) n{i}", i + 1));
    }

    let start = Instant::now();
    let records = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(chunk(100, 20)))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_millis(102));
    assert!(!records.is_empty());
    assert!(records.len() <= 11);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_without_lines_times_out() {
    let h = harness();
    let entry = pattern(ENTRY);

    let err = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(chunk(50, 20)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_empty_dump_can_resolve() {
    let h = harness();
    let entry = pattern(ENTRY);
    let options = chunk(50, 20).empty_dump(EmptyDumpPolicy::Resolve);

    let records = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(options))
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_discards_partial_dump() {
    let h = harness();
    let entry = pattern(ENTRY);

    emit_after(&h.lines, 1, "0) old");
    emit_after(&h.lines, 2, "1) stale");
    emit_after(&h.lines, 3, "0) alpha");
    emit_after(&h.lines, 4, "1) beta");

    let records = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(chunk(500, 20)))
        .await
        .unwrap();
    let names: Vec<_> = records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(records.iter().all(|r| r.dump == 1));
}

#[tokio::test(start_paused = true)]
async fn test_restart_keep_both_numbers_dumps() {
    let h = harness();
    let entry = pattern(ENTRY);
    let options = chunk(500, 20).restart(RestartPolicy::KeepBoth);

    emit_after(&h.lines, 1, "0) a");
    emit_after(&h.lines, 2, "1) b");
    emit_after(&h.lines, 3, "0) c");

    let records = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(options))
        .await
        .unwrap();
    let dumps: Vec<_> = records.iter().map(|r| r.dump).collect();
    assert_eq!(dumps, vec![0, 0, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_restart_finish_current_resolves_immediately() {
    let h = harness();
    let entry = pattern(ENTRY);
    let options = chunk(500, 100).restart(RestartPolicy::FinishCurrent);

    emit_after(&h.lines, 1, "0) a");
    emit_after(&h.lines, 2, "1) b");
    emit_after(&h.lines, 3, "0) c");

    let start = Instant::now();
    let records = h
        .console
        .run("GetAll Thing Name", &entry, WatchKind::Chunk(options))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(10));
    let names: Vec<_> = records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_pattern_must_carry_group_key() {
    let h = harness();
    let keyless = pattern(r"^(?<name>\w+)$");

    let err = h
        .console
        .run("GetAll Thing Name", &keyless, WatchKind::Chunk(chunk(50, 20)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Pattern(_)));
    assert!(h.sink.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_dump_larger_than_broadcast_capacity_is_complete() {
    let output = OutputStream::new(4);
    let (console, _dispatcher) =
        Dispatcher::spawn(output.feed(), Arc::new(RecordingSink::new()));
    let entry = pattern(ENTRY);

    let armed = console
        .watch(&entry, WatchKind::Chunk(chunk(10_000, 200)))
        .await
        .unwrap();
    let pending = armed.send("GetAll Brick Name").unwrap();
    for i in 0..2000 {
        output.publish(format!("{}) brick{i}", i + 1));
    }

    let records = pending.wait().await.unwrap();
    assert_eq!(records.len(), 2000);
    assert_eq!(records[0].get("name"), Some("brick0"));
    assert_eq!(records[1999].get("name"), Some("brick1999"));
}
