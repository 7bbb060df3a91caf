//! Streaming process execution.
//!
//! This module starts external commands (the compiler and the launcher) and
//! surfaces their stdout and stderr while they run:
//!
//! - each output stream gets its own reader task and [`OutputQueue`], so a
//!   full pipe on one stream never blocks the other
//! - [`StreamingProcess::forward`] waits on whichever stream or the process
//!   becomes ready first and writes decoded text to an [`OutputSink`]
//! - chunks keep their order within a stream; no order is kept between
//!   stdout and stderr

mod decode;
mod queue;

pub use decode::StreamDecoder;
pub use queue::OutputQueue;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::consts::OUTPUT_GRACE;
use crate::sink::{OutputKind, OutputSink};

/// Errors raised while starting or supervising a child process.
#[derive(Debug, Error)]
pub enum RunnerError {
  /// The program could not be started at all (missing binary, permissions).
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// Waiting for the child to exit failed.
  #[error("failed to wait for child process: {0}")]
  Wait(#[source] std::io::Error),

  /// The process ran longer than the configured timeout and was killed.
  #[error("{program} timed out after {after:?}")]
  TimedOut { program: String, after: Duration },
}

/// A program and its arguments, run without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
  program: OsString,
  args: Vec<OsString>,
}

impl CommandLine {
  pub fn new(program: impl Into<OsString>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn program(&self) -> &OsStr {
    &self.program
  }

  pub fn get_args(&self) -> &[OsString] {
    &self.args
  }

  /// Program and arguments as lossily converted strings.
  pub fn to_vec_lossy(&self) -> Vec<String> {
    std::iter::once(&self.program)
      .chain(&self.args)
      .map(|s| s.to_string_lossy().into_owned())
      .collect()
  }
}

impl fmt::Display for CommandLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_vec_lossy().join(" "))
  }
}

/// Everything a finished process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
  /// Exit code; a process killed by a signal reports `128 + signal`.
  pub exit_code: i32,
  pub stdout_chunks: Vec<Vec<u8>>,
  pub stderr_chunks: Vec<Vec<u8>>,
}

impl ProcessResult {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }

  pub fn stdout(&self) -> String {
    String::from_utf8_lossy(&self.stdout_chunks.concat()).into_owned()
  }

  pub fn stderr(&self) -> String {
    String::from_utf8_lossy(&self.stderr_chunks.concat()).into_owned()
  }
}

/// Starts commands with both output streams captured.
pub trait CommandRunner {
  fn spawn(&self, command: &CommandLine) -> Result<StreamingProcess, RunnerError>;
}

/// The default runner, backed by `tokio::process`.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
  fn spawn(&self, command: &CommandLine) -> Result<StreamingProcess, RunnerError> {
    debug!(command = %command, "spawning process");

    let mut child = Command::new(command.program())
      .args(command.get_args())
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| RunnerError::Spawn {
        program: command.program().to_string_lossy().into_owned(),
        source,
      })?;

    debug!(pid = ?child.id(), "process started");

    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");
    let (stdout, stdout_reader) = OutputQueue::spawn(OutputKind::Stdout, stdout);
    let (stderr, stderr_reader) = OutputQueue::spawn(OutputKind::Stderr, stderr);

    Ok(StreamingProcess {
      program: command.program().to_string_lossy().into_owned(),
      child,
      stdout,
      stderr,
      readers: vec![stdout_reader, stderr_reader],
    })
  }
}

/// A running child process and the queues carrying its output.
#[derive(Debug)]
pub struct StreamingProcess {
  program: String,
  child: Child,
  stdout: OutputQueue,
  stderr: OutputQueue,
  readers: Vec<JoinHandle<()>>,
}

impl StreamingProcess {
  /// OS process id, while the process has not been reaped.
  pub fn id(&self) -> Option<u32> {
    self.child.id()
  }

  /// Non-blocking liveness check: `Some(code)` once the process has exited.
  pub fn try_exit_code(&mut self) -> Result<Option<i32>, RunnerError> {
    self
      .child
      .try_wait()
      .map(|status| status.map(exit_code))
      .map_err(RunnerError::Wait)
  }

  pub fn stdout_mut(&mut self) -> &mut OutputQueue {
    &mut self.stdout
  }

  pub fn stderr_mut(&mut self) -> &mut OutputQueue {
    &mut self.stderr
  }

  /// Wait for the process to exit, without consuming its output.
  pub async fn wait(&mut self) -> Result<i32, RunnerError> {
    self.child.wait().await.map(exit_code).map_err(RunnerError::Wait)
  }

  /// Kill the process. Errors are logged; a process that already exited is fine.
  pub async fn kill(&mut self) {
    if let Err(e) = self.child.kill().await {
      warn!(program = %self.program, error = %e, "failed to kill process");
    }
  }

  /// Forward output to `sink` as it arrives until the process exits.
  ///
  /// Each chunk is decoded and written immediately. Once the process has
  /// exited, output still in flight is collected for at most
  /// [`OUTPUT_GRACE`]; pipes inherited by background children do not keep
  /// the call waiting. With a `timeout`, the process is killed once it
  /// elapses and [`RunnerError::TimedOut`] is returned; output forwarded up to
  /// that point stays with the sink.
  pub async fn forward<S>(mut self, sink: &mut S, timeout: Option<Duration>) -> Result<ProcessResult, RunnerError>
  where
    S: OutputSink + ?Sized,
  {
    let mut collected = Collected::default();

    let deadline = async {
      match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
      }
    };
    tokio::pin!(deadline);

    let status = loop {
      tokio::select! {
        chunk = self.stdout.recv(), if !self.stdout.is_closed() => {
          if let Some(chunk) = chunk {
            collected.push(sink, OutputKind::Stdout, chunk);
          }
        }
        chunk = self.stderr.recv(), if !self.stderr.is_closed() => {
          if let Some(chunk) = chunk {
            collected.push(sink, OutputKind::Stderr, chunk);
          }
        }
        exited = self.child.wait() => {
          let exited = exited.map_err(RunnerError::Wait)?;
          debug!(program = %self.program, status = %exited, "process exited");
          break exited;
        }
        _ = &mut deadline => {
          self.kill().await;
          collected.finish(sink);
          return Err(RunnerError::TimedOut {
            program: self.program.clone(),
            after: timeout.unwrap_or_default(),
          });
        }
      }
    };

    let grace = tokio::time::sleep(OUTPUT_GRACE);
    tokio::pin!(grace);
    while !(self.stdout.is_closed() && self.stderr.is_closed()) {
      tokio::select! {
        chunk = self.stdout.recv(), if !self.stdout.is_closed() => {
          if let Some(chunk) = chunk {
            collected.push(sink, OutputKind::Stdout, chunk);
          }
        }
        chunk = self.stderr.recv(), if !self.stderr.is_closed() => {
          if let Some(chunk) = chunk {
            collected.push(sink, OutputKind::Stderr, chunk);
          }
        }
        _ = &mut grace => {
          debug!(program = %self.program, "output still open after exit, detaching");
          break;
        }
      }
    }

    let rest = self.stdout.drain();
    collected.push(sink, OutputKind::Stdout, rest);
    let rest = self.stderr.drain();
    collected.push(sink, OutputKind::Stderr, rest);
    collected.finish(sink);

    for reader in self.readers.drain(..) {
      if !reader.is_finished() {
        reader.abort();
        continue;
      }
      if let Err(e) = reader.await {
        warn!(program = %self.program, error = %e, "output reader task failed");
      }
    }

    let mut result = collected.result;
    result.exit_code = exit_code(status);
    Ok(result)
  }
}

/// Output gathered by [`StreamingProcess::forward`].
#[derive(Default)]
struct Collected {
  result: ProcessResult,
  stdout: StreamDecoder,
  stderr: StreamDecoder,
}

impl Collected {
  fn push<S>(&mut self, sink: &mut S, kind: OutputKind, chunk: Vec<u8>)
  where
    S: OutputSink + ?Sized,
  {
    if chunk.is_empty() {
      return;
    }
    match kind {
      OutputKind::Stderr => {
        emit(sink, kind, self.stderr.decode(&chunk));
        self.result.stderr_chunks.push(chunk);
      }
      OutputKind::Stdout | OutputKind::Status => {
        emit(sink, kind, self.stdout.decode(&chunk));
        self.result.stdout_chunks.push(chunk);
      }
    }
  }

  /// Flush partial characters held by the decoders.
  fn finish<S>(&mut self, sink: &mut S)
  where
    S: OutputSink + ?Sized,
  {
    emit(sink, OutputKind::Stdout, self.stdout.finish());
    emit(sink, OutputKind::Stderr, self.stderr.finish());
  }
}

fn emit<S>(sink: &mut S, kind: OutputKind, text: String)
where
  S: OutputSink + ?Sized,
{
  if !text.is_empty() {
    sink.write(kind, &text);
  }
}

/// Map an exit status to an integer code.
fn exit_code(status: ExitStatus) -> i32 {
  if let Some(code) = status.code() {
    return code;
  }

  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
      return 128 + signal;
    }
  }

  -1
}
