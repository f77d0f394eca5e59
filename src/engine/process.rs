//! Engine process spawning and control.
//!
//! This is a thin adapter: it starts the engine with piped stdio, frames its
//! stdout into an [`OutputStream`] and exposes stdin as a
//! [`CommandChannel`]. Restart and supervision belong to the caller.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::channel::CommandChannel;
use super::framer::{LineFramer, LineNormalizer};
use super::output::OutputStream;

/// Reasons the engine could not be started.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    #[error("Engine binary not found: {0}")]
    NotFound(String),

    #[error("Engine binary {0} is not executable")]
    NotExecutable(String),

    /// The child came up without one of its console pipes.
    #[error("Engine {0} pipe not available")]
    MissingPipe(&'static str),

    #[error("Failed to launch engine: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    fn launching(binary: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(binary.to_string()),
            ErrorKind::PermissionDenied => Self::NotExecutable(binary.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for the engine command line.
#[derive(Debug, Clone, Default)]
pub struct EngineProcessBuilder {
    binary: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl EngineProcessBuilder {
    /// Create a new builder for the given binary.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the engine.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the binary name.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Get the arguments.
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }
}

/// A running engine with its console wired up.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    commands: CommandChannel,
    output: OutputStream,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineProcess {
    /// Spawn the engine and start pumping its output.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn or a pipe is missing.
    pub fn spawn(
        builder: &EngineProcessBuilder,
        normalizer: LineNormalizer,
        broadcast_capacity: usize,
    ) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&builder.binary);
        cmd.args(&builder.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(ref dir) = builder.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::launching(&builder.binary, e))?;
        let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SpawnError::MissingPipe("stdout"))?;

        tracing::info!(
            binary = %builder.binary,
            pid = ?child.id(),
            "Engine process started"
        );

        let output = OutputStream::new(broadcast_capacity);
        let (commands, writer) = CommandChannel::spawn(stdin);
        let pump = tokio::spawn(
            output
                .clone()
                .pump(LineFramer::new(stdout, normalizer).into_stream()),
        );

        Ok(Self {
            child,
            commands,
            output,
            tasks: vec![writer, pump],
        })
    }

    /// The engine's command input.
    #[must_use]
    pub fn commands(&self) -> CommandChannel {
        self.commands.clone()
    }

    /// The engine's output broadcast.
    ///
    /// Subscribe before sending commands that produce the lines of interest.
    #[must_use]
    pub fn output(&self) -> &OutputStream {
        &self.output
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Ask the engine to stop, killing it if it outlives `grace`.
    ///
    /// On Unix the engine first gets SIGTERM so it can save and exit on its
    /// own. Elsewhere, or if the signal cannot be delivered, it is killed
    /// straight away. The output pump and command writer stop either way.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting for or killing the process fails.
    pub async fn graceful_terminate(&mut self, grace: Duration) -> std::io::Result<()> {
        let outcome = if self.child.id().is_none() {
            Ok(())
        } else if self.request_stop() {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(exited) => exited.map(|status| {
                    tracing::info!(?status, "Engine stopped");
                }),
                Err(_) => {
                    tracing::warn!(
                        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                        "Engine still running after SIGTERM, killing"
                    );
                    self.child.kill().await
                }
            }
        } else {
            self.child.kill().await
        };

        for task in self.tasks.drain(..) {
            task.abort();
        }
        outcome
    }

    /// Send SIGTERM. Returns whether the signal was delivered.
    #[cfg(unix)]
    fn request_stop(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                tracing::debug!(pid, "Sent SIGTERM to engine");
                true
            }
            Err(errno) => {
                tracing::debug!(pid, %errno, "SIGTERM not delivered");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&self) -> bool {
        false
    }
}
