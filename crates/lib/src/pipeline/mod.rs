//! The cell pipeline.
//!
//! A [`Pipeline`] owns the loader stub and runs cells through:
//!
//! ```text
//! Idle -> Parsing -> Compiling -> CompileFailed
//!                              -> Compiled -> Running -> Done
//! ```
//!
//! Compiler and program output is forwarded to the host's [`OutputSink`]
//! while each process runs. A cell whose compilation fails never reaches
//! the run step. The cell's source file and compiled unit are removed when
//! [`Pipeline::run_cell`] returns, whatever the outcome.

mod command;

pub use command::{compile_command, run_command};

use std::fmt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{ArtifactKind, TempArtifact};
use crate::config::{ConfigError, PipelineConfig};
use crate::directive::parse_directives;
use crate::process::{CommandRunner, ProcessResult, ProcessRunner, RunnerError, StreamingProcess};
use crate::sink::{OutputKind, OutputSink};
use crate::stub::{LoaderStub, StubError};

/// Stages a cell moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  Parsing,
  Compiling,
  CompileFailed,
  Compiled,
  Running,
  Done,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Idle => "idle",
      PipelineState::Parsing => "parsing",
      PipelineState::Compiling => "compiling",
      PipelineState::CompileFailed => "compile-failed",
      PipelineState::Compiled => "compiled",
      PipelineState::Running => "running",
      PipelineState::Done => "done",
    };
    write!(f, "{name}")
  }
}

/// Which process a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Compile,
  Run,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Compile => write!(f, "compile"),
      Stage::Run => write!(f, "run"),
    }
  }
}

/// Conditions that stop a cell before it produces an outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Stub(#[from] StubError),

  /// Writing the cell source or reserving the unit path failed.
  #[error("failed to create temporary artifact: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to start compiler: {0}")]
  CompileStartup(#[source] RunnerError),

  #[error("failed to start loader stub: {0}")]
  RunStartup(#[source] RunnerError),

  #[error("{stage} step timed out: {source}")]
  TimedOut {
    stage: Stage,
    #[source]
    source: RunnerError,
  },

  #[error("{stage} step failed: {source}")]
  Forward {
    stage: Stage,
    #[source]
    source: RunnerError,
  },
}

/// How a cell ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOutcome {
  /// The compiler exited nonzero; the cell was not run.
  CompileFailed { compile: ProcessResult },
  /// The cell compiled and ran; `run.exit_code` is what `run()` returned.
  Completed { compile: ProcessResult, run: ProcessResult },
}

impl CellOutcome {
  /// The terminal state the cell reached.
  pub fn state(&self) -> PipelineState {
    match self {
      CellOutcome::CompileFailed { .. } => PipelineState::CompileFailed,
      CellOutcome::Completed { .. } => PipelineState::Done,
    }
  }

  /// Exit code of the last process that ran.
  pub fn exit_code(&self) -> i32 {
    match self {
      CellOutcome::CompileFailed { compile } => compile.exit_code,
      CellOutcome::Completed { run, .. } => run.exit_code,
    }
  }

  pub fn compile(&self) -> &ProcessResult {
    match self {
      CellOutcome::CompileFailed { compile } | CellOutcome::Completed { compile, .. } => compile,
    }
  }

  pub fn run(&self) -> Option<&ProcessResult> {
    match self {
      CellOutcome::CompileFailed { .. } => None,
      CellOutcome::Completed { run, .. } => Some(run),
    }
  }

  pub fn success(&self) -> bool {
    matches!(self, CellOutcome::Completed { run, .. } if run.success())
  }
}

/// Compiles and runs cells, sharing one loader stub between them.
///
/// Cells are expected to be submitted one at a time.
#[derive(Debug)]
pub struct Pipeline<R = ProcessRunner> {
  config: PipelineConfig,
  timeout: Option<Duration>,
  runner: R,
  stub: LoaderStub,
}

impl Pipeline<ProcessRunner> {
  /// Build or adopt the loader stub described by `config` and use the
  /// default process runner.
  pub async fn init(config: PipelineConfig) -> Result<Self, PipelineError> {
    let stub = LoaderStub::for_config(&config).await?;
    Self::new(config, ProcessRunner, stub)
  }
}

impl<R: CommandRunner> Pipeline<R> {
  pub fn new(config: PipelineConfig, runner: R, stub: LoaderStub) -> Result<Self, PipelineError> {
    let timeout = config.timeout()?;
    Ok(Self {
      config,
      timeout,
      runner,
      stub,
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn stub(&self) -> &LoaderStub {
    &self.stub
  }

  pub fn runner(&self) -> &R {
    &self.runner
  }

  /// Compile `source` and, if that succeeds, run it.
  ///
  /// Output from both steps is written to `sink` as it is produced, preceded
  /// by `Compiling...` and `Running...` status lines. A failed compilation is
  /// reported to the sink and returned as [`CellOutcome::CompileFailed`].
  /// Startup failures and timeouts are reported to the sink and returned as
  /// errors.
  pub async fn run_cell<S>(&self, source: &str, sink: &mut S) -> Result<CellOutcome, PipelineError>
  where
    S: OutputSink + ?Sized,
  {
    enter(PipelineState::Parsing);
    let build = parse_directives(source);
    debug!(
      cflags = ?build.compile_flags(),
      ldflags = ?build.link_flags(),
      args = ?build.program_args(),
      "directives parsed"
    );

    let work_dir = self.config.work_dir();
    let (source_file, unit) = cell_artifacts(&work_dir, source).map_err(|e| {
      sink.write(OutputKind::Status, &format!("Failed to create temporary artifact: {e}\n"));
      PipelineError::Io(e)
    })?;

    enter(PipelineState::Compiling);
    info!(source = %source_file.path().display(), "compiling cell");
    sink.write(OutputKind::Status, "Compiling...\n");

    let compile_cmd = compile_command(&self.config, &build, source_file.path(), unit.path());
    let process = self.runner.spawn(&compile_cmd).map_err(|e| {
      sink.write(OutputKind::Status, &format!("Failed to start compiler: {e}\n"));
      PipelineError::CompileStartup(e)
    })?;
    let compile = self.forward(process, sink, Stage::Compile).await?;

    if !compile.success() {
      enter(PipelineState::CompileFailed);
      sink.write(
        OutputKind::Status,
        &format!("Compilation failed (exit code {})\n", compile.exit_code),
      );
      return Ok(CellOutcome::CompileFailed { compile });
    }
    enter(PipelineState::Compiled);

    enter(PipelineState::Running);
    info!(unit = %unit.path().display(), "running cell");
    sink.write(OutputKind::Status, "Running...\n");

    let run_cmd = run_command(self.stub.path(), &build, unit.path());
    let process = self.runner.spawn(&run_cmd).map_err(|e| {
      sink.write(OutputKind::Status, &format!("Failed to start loader stub: {e}\n"));
      PipelineError::RunStartup(e)
    })?;
    let run = self.forward(process, sink, Stage::Run).await?;

    if !run.success() {
      sink.write(OutputKind::Status, &format!("Process exited with code {}\n", run.exit_code));
    }

    enter(PipelineState::Done);
    Ok(CellOutcome::Completed { compile, run })
  }

  /// Release the loader stub.
  pub fn teardown(self) {
    self.stub.teardown();
  }

  async fn forward<S>(&self, process: StreamingProcess, sink: &mut S, stage: Stage) -> Result<ProcessResult, PipelineError>
  where
    S: OutputSink + ?Sized,
  {
    match process.forward(sink, self.timeout).await {
      Ok(result) => {
        debug!(stage = %stage, exit_code = result.exit_code, "process finished");
        Ok(result)
      }
      Err(source @ RunnerError::TimedOut { .. }) => {
        sink.write(OutputKind::Status, &format!("Timed out: {source}\n"));
        Err(PipelineError::TimedOut { stage, source })
      }
      Err(source) => Err(PipelineError::Forward { stage, source }),
    }
  }
}

/// The cell's source file and the reserved path for its compiled unit.
fn cell_artifacts(work_dir: &Path, source: &str) -> std::io::Result<(TempArtifact, TempArtifact)> {
  let source_file = TempArtifact::create(work_dir, ArtifactKind::Source, source.as_bytes())?;
  let unit = TempArtifact::create(work_dir, ArtifactKind::Unit, b"")?;
  Ok((source_file, unit))
}

fn enter(state: PipelineState) {
  debug!(state = %state, "pipeline state");
}
