//! Output sinks.
//!
//! A sink is whatever the host uses to show text to the user: a notebook
//! output area, a terminal, or a buffer in tests. The pipeline writes to it
//! many times per cell, as soon as output is available.

use std::fmt;

/// What a piece of sink output represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
  /// Progress and diagnostic messages produced by the pipeline itself.
  Status,
  /// Standard output of the compiler or the program.
  Stdout,
  /// Standard error of the compiler or the program.
  Stderr,
}

impl fmt::Display for OutputKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutputKind::Status => write!(f, "status"),
      OutputKind::Stdout => write!(f, "stdout"),
      OutputKind::Stderr => write!(f, "stderr"),
    }
  }
}

/// Receives decoded text while a cell is being built and run.
pub trait OutputSink {
  fn write(&mut self, kind: OutputKind, text: &str);
}

impl<F> OutputSink for F
where
  F: FnMut(OutputKind, &str),
{
  fn write(&mut self, kind: OutputKind, text: &str) {
    self(kind, text)
  }
}

/// A sink that records every write, in order.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
  writes: Vec<(OutputKind, String)>,
}

impl CapturedOutput {
  pub fn new() -> Self {
    Self::default()
  }

  /// All writes in the order they were received.
  pub fn writes(&self) -> &[(OutputKind, String)] {
    &self.writes
  }

  /// Everything written, concatenated.
  pub fn text(&self) -> String {
    self.writes.iter().map(|(_, text)| text.as_str()).collect()
  }

  /// Everything written with the given kind, concatenated.
  pub fn text_of(&self, kind: OutputKind) -> String {
    self
      .writes
      .iter()
      .filter(|(k, _)| *k == kind)
      .map(|(_, text)| text.as_str())
      .collect()
  }
}

impl OutputSink for CapturedOutput {
  fn write(&mut self, kind: OutputKind, text: &str) {
    self.writes.push((kind, text.to_string()));
  }
}
