//! Scoped temporary files.
//!
//! Every file the pipeline writes (cell sources, compiled units, the loader
//! stub) is a [`TempArtifact`]. Dropping one removes the file. Removal is
//! best-effort: failures are logged and never reach the caller, and a file
//! that is already gone is not an error.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use crate::consts::APP_NAME;

/// What a temporary file is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
  /// Cell source written for the compiler.
  Source,
  /// Shared object produced from a cell.
  Unit,
  /// Launcher binary shared by every cell of a pipeline.
  LoaderStub,
}

impl ArtifactKind {
  fn suffix(self) -> &'static str {
    match self {
      ArtifactKind::Source => ".c",
      ArtifactKind::Unit => ".so",
      ArtifactKind::LoaderStub => "",
    }
  }
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactKind::Source => write!(f, "source"),
      ArtifactKind::Unit => write!(f, "unit"),
      ArtifactKind::LoaderStub => write!(f, "loader-stub"),
    }
  }
}

/// A uniquely named file in `dir` that is deleted when dropped.
#[derive(Debug)]
pub struct TempArtifact {
  path: PathBuf,
  kind: ArtifactKind,
}

impl TempArtifact {
  /// Create a new file in `dir` holding `contents`.
  ///
  /// The name is unique and carries the suffix matching `kind`, so an empty
  /// `contents` reserves a path for a tool to write into.
  pub fn create(dir: &Path, kind: ArtifactKind, contents: &[u8]) -> io::Result<Self> {
    let named = tempfile::Builder::new()
      .prefix(&format!("{APP_NAME}-{kind}-"))
      .suffix(kind.suffix())
      .tempfile_in(dir)?;

    let (mut file, path) = named.keep().map_err(|e| e.error)?;
    // From here on the artifact owns the path, so a failed write still
    // cleans up on drop.
    let artifact = Self { path, kind };
    file.write_all(contents)?;
    file.flush()?;

    trace!(path = %artifact.path.display(), kind = %kind, "artifact created");
    Ok(artifact)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn kind(&self) -> ArtifactKind {
    self.kind
  }

  /// Remove the file now instead of at the end of scope.
  pub fn release(self) {
    drop(self)
  }
}

impl Drop for TempArtifact {
  fn drop(&mut self) {
    match std::fs::remove_file(&self.path) {
      Ok(()) => trace!(path = %self.path.display(), kind = %self.kind, "artifact removed"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => warn!(
        path = %self.path.display(),
        kind = %self.kind,
        error = %e,
        "failed to remove temporary artifact"
      ),
    }
  }
}
