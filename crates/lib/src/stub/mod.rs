//! The loader stub.
//!
//! Cells are compiled as shared objects, so running one needs a small
//! launcher that loads the object and calls `run`. The launcher is built once
//! per pipeline and reused for every cell:
//!
//! - [`LoaderStub::build`] compiles the embedded C launcher with the
//!   configured compiler and owns the resulting binary
//! - [`LoaderStub::prebuilt`] adopts an existing launcher such as
//!   `ccell-launch`, which is never deleted
//!
//! The stub is an explicit resource: created at pipeline construction and
//! released by [`LoaderStub::teardown`] (or on drop).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::artifact::{ArtifactKind, TempArtifact};
use crate::config::PipelineConfig;
use crate::process::CommandLine;

/// Source of the native launcher.
pub const LAUNCHER_SOURCE: &str = include_str!("launcher.c");

/// Errors raised while preparing the loader stub.
#[derive(Debug, Error)]
pub enum StubError {
  #[error("failed to prepare loader stub files: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to start compiler {compiler}: {source}")]
  Spawn {
    compiler: String,
    #[source]
    source: std::io::Error,
  },

  #[error("loader stub failed to compile (exit code {code:?}):\n{output}")]
  CompileFailed { code: Option<i32>, output: String },

  #[error("launcher not found: {0}")]
  NotFound(PathBuf),
}

#[derive(Debug)]
enum StubBinary {
  Owned(TempArtifact),
  External(PathBuf),
}

/// The launcher binary used for every run step.
#[derive(Debug)]
pub struct LoaderStub {
  binary: StubBinary,
}

impl LoaderStub {
  /// Use `config.launcher` if set, otherwise build the native stub.
  pub async fn for_config(config: &PipelineConfig) -> Result<Self, StubError> {
    match &config.launcher {
      Some(path) => Self::prebuilt(path),
      None => Self::build(config).await,
    }
  }

  /// Compile the embedded C launcher into the work directory.
  pub async fn build(config: &PipelineConfig) -> Result<Self, StubError> {
    let work_dir = config.work_dir();
    let source = TempArtifact::create(&work_dir, ArtifactKind::Source, LAUNCHER_SOURCE.as_bytes())?;
    let binary = TempArtifact::create(&work_dir, ArtifactKind::LoaderStub, b"")?;

    let command = build_command(config, source.path(), binary.path());
    info!(compiler = %config.compiler, "building loader stub");
    debug!(command = %command, "loader stub build command");

    let output = Command::new(command.program())
      .args(command.get_args())
      .output()
      .await
      .map_err(|source| StubError::Spawn {
        compiler: config.compiler.clone(),
        source,
      })?;

    if !output.status.success() {
      let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
      text.push_str(&String::from_utf8_lossy(&output.stderr));
      return Err(StubError::CompileFailed {
        code: output.status.code(),
        output: text,
      });
    }

    source.release();
    debug!(path = %binary.path().display(), "loader stub ready");

    Ok(Self {
      binary: StubBinary::Owned(binary),
    })
  }

  /// Adopt an existing launcher binary.
  pub fn prebuilt(path: impl Into<PathBuf>) -> Result<Self, StubError> {
    let path = path.into();
    if !path.is_file() {
      return Err(StubError::NotFound(path));
    }
    debug!(path = %path.display(), "using prebuilt launcher");
    Ok(Self {
      binary: StubBinary::External(path),
    })
  }

  pub fn path(&self) -> &Path {
    match &self.binary {
      StubBinary::Owned(artifact) => artifact.path(),
      StubBinary::External(path) => path,
    }
  }

  /// Whether the binary was built by this stub and is deleted on teardown.
  pub fn is_owned(&self) -> bool {
    matches!(self.binary, StubBinary::Owned(_))
  }

  /// Release the stub, deleting the binary if this stub built it.
  pub fn teardown(self) {
    debug!(path = %self.path().display(), owned = self.is_owned(), "tearing down loader stub");
    drop(self)
  }
}

/// `<cc> <stub.c> -std=<std> -rdynamic -ldl -o <binary>`
pub fn build_command(config: &PipelineConfig, source: &Path, binary: &Path) -> CommandLine {
  CommandLine::new(&config.compiler)
    .arg(source)
    .arg(config.std_flag())
    .args(["-rdynamic", "-ldl", "-o"])
    .arg(binary)
}
