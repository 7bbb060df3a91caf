//! Terminal output for the CLI.
//!
//! Program stdout is the only thing written to stdout. Status lines,
//! diagnostics and summaries go to stderr, colored when the terminal
//! supports it.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use tracing::debug;

use ccell_lib::{OutputKind, OutputSink};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Writes cell output to the terminal as it arrives.
#[derive(Debug)]
pub struct TerminalSink {
  stdout: io::Stdout,
  stderr: io::Stderr,
}

impl TerminalSink {
  pub fn new() -> Self {
    Self {
      stdout: io::stdout(),
      stderr: io::stderr(),
    }
  }
}

impl Default for TerminalSink {
  fn default() -> Self {
    Self::new()
  }
}

impl OutputSink for TerminalSink {
  fn write(&mut self, kind: OutputKind, text: &str) {
    let result = match kind {
      OutputKind::Status => {
        let line = text.trim_end_matches('\n');
        writeln!(
          self.stderr,
          "{} {}",
          symbols::ARROW.if_supports_color(Stream::Stderr, |s| s.cyan()),
          line.if_supports_color(Stream::Stderr, |s| s.dimmed())
        )
      }
      OutputKind::Stdout => self.stdout.write_all(text.as_bytes()).and_then(|()| self.stdout.flush()),
      OutputKind::Stderr => self.stderr.write_all(text.as_bytes()).and_then(|()| self.stderr.flush()),
    };
    if let Err(e) = result {
      debug!(kind = %kind, error = %e, "failed to write cell output");
    }
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Header printed before each cell of a session.
pub fn print_cell_header(number: usize, total: usize) {
  let header = format!("[cell {number}/{total}]");
  eprintln!("{}", header.if_supports_color(Stream::Stderr, |s| s.bold()));
}

/// One-line result printed after each cell of a session.
pub fn print_cell_summary(number: usize, exit_code: i32, elapsed: Duration) {
  let message = format!("cell {number} exited with code {exit_code} in {}", format_duration(elapsed));
  if exit_code == 0 {
    eprintln!(
      "{} {}",
      symbols::SUCCESS.if_supports_color(Stream::Stderr, |s| s.green()),
      message
    );
  } else {
    print_error(&message);
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
