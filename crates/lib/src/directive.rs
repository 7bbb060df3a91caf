//! Inline build directives.
//!
//! A cell configures its own build through comment lines that start with
//! `//%` followed by `key: value`:
//!
//! ```text
//! //%cflags: -O2 -Wall
//! //%ldflags: -lm
//! //%args: input.txt "two words"
//! ```
//!
//! Recognized keys are `cflags`, `ldflags` and `args` (case-insensitive).
//! Lines without a `:` and unknown keys are skipped. Parsing never fails.

use serde::Serialize;
use tracing::trace;

use crate::consts::DIRECTIVE_MARKER;

/// Build configuration extracted from a single cell.
///
/// Token order matches the order in which directives appear in the source;
/// repeated directives accumulate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildConfig {
  compile_flags: Vec<String>,
  link_flags: Vec<String>,
  program_args: Vec<String>,
}

impl BuildConfig {
  /// Extra flags placed before `-o` on the compile command line.
  pub fn compile_flags(&self) -> &[String] {
    &self.compile_flags
  }

  /// Extra flags placed after the output path on the compile command line.
  pub fn link_flags(&self) -> &[String] {
    &self.link_flags
  }

  /// Arguments passed to the launcher after the unit path.
  pub fn program_args(&self) -> &[String] {
    &self.program_args
  }

  pub fn is_empty(&self) -> bool {
    self.compile_flags.is_empty() && self.link_flags.is_empty() && self.program_args.is_empty()
  }
}

/// The directive keys understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKey {
  CFlags,
  LdFlags,
  Args,
}

impl DirectiveKey {
  fn from_key(key: &str) -> Option<Self> {
    match key.to_ascii_lowercase().as_str() {
      "cflags" => Some(DirectiveKey::CFlags),
      "ldflags" => Some(DirectiveKey::LdFlags),
      "args" => Some(DirectiveKey::Args),
      _ => None,
    }
  }
}

/// Extract a [`BuildConfig`] from cell source text.
pub fn parse_directives(source: &str) -> BuildConfig {
  let mut config = BuildConfig::default();

  for line in source.lines() {
    let Some(body) = line.strip_prefix(DIRECTIVE_MARKER) else {
      continue;
    };

    let Some((key, value)) = body.split_once(':') else {
      trace!(line = %line, "directive without ':' ignored");
      continue;
    };

    match DirectiveKey::from_key(key.trim()) {
      Some(DirectiveKey::CFlags) => config.compile_flags.extend(value.split_whitespace().map(str::to_string)),
      Some(DirectiveKey::LdFlags) => config.link_flags.extend(value.split_whitespace().map(str::to_string)),
      Some(DirectiveKey::Args) => config.program_args.extend(tokenize_args(value)),
      None => trace!(key = %key.trim(), "unknown directive ignored"),
    }
  }

  config
}

/// Split an `args` directive value into argv tokens.
///
/// Whitespace and commas separate tokens outside of double quotes. Quoted
/// spans join with adjacent unquoted text into a single token and lose their
/// quote characters. Inside quotes a backslash escapes the next character;
/// outside quotes it is literal. An unterminated quote runs to the end of
/// the value.
pub fn tokenize_args(value: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut current = String::new();
  // A quoted span counts as a token even when empty (`""`).
  let mut in_token = false;
  let mut chars = value.chars();

  while let Some(c) = chars.next() {
    match c {
      '"' => {
        in_token = true;
        while let Some(q) = chars.next() {
          match q {
            '"' => break,
            '\\' => match chars.next() {
              Some(escaped) => current.push(escaped),
              None => current.push('\\'),
            },
            other => current.push(other),
          }
        }
      }
      c if c.is_whitespace() || c == ',' => {
        if in_token {
          tokens.push(std::mem::take(&mut current));
          in_token = false;
        }
      }
      other => {
        in_token = true;
        current.push(other);
      }
    }
  }

  if in_token {
    tokens.push(current);
  }

  tokens
}
