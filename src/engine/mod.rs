//! Engine console plumbing: command input, framed output, process spawn.

mod channel;
mod framer;
mod output;
mod process;

pub use channel::{CommandChannel, CommandError, CommandSink, RecordingSink};
pub use framer::{LineFramer, LineNormalizer, DEFAULT_LINE_PREFIX};
pub use output::{OutputStream, DEFAULT_BROADCAST_CAPACITY};
pub use process::{EngineProcess, EngineProcessBuilder, SpawnError};
