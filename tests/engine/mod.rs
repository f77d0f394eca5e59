//! Engine process tests.

mod process_test;

/// Verify the engine types are exported from the library.
#[test]
fn test_engine_types_exported() {
    use brick_console::engine::{
        CommandChannel, CommandError, CommandSink, EngineProcessBuilder, LineFramer,
        LineNormalizer, OutputStream, RecordingSink, SpawnError, DEFAULT_LINE_PREFIX,
    };

    let _ = EngineProcessBuilder::new("server");
    let _ = LineNormalizer::with_prefix(DEFAULT_LINE_PREFIX).unwrap();
    let _ = OutputStream::new(8);
    let sink: &dyn CommandSink = &RecordingSink::new();
    assert!(sink.send("Ping").is_ok());

    let _: fn() -> CommandError = || CommandError::Closed;
    let _: fn() -> SpawnError = || SpawnError::MissingPipe("stdin");
    let _: Option<CommandChannel> = None;
    let _: Option<LineFramer<&[u8]>> = None;
}
