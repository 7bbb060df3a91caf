//! Implementation of the `ccell parse` command.

use std::path::Path;

use anyhow::Result;

use ccell_lib::parse_directives;

use super::read_source;
use crate::output::{OutputFormat, print_info, print_json, print_stat};

/// Print the build configuration a cell declares.
pub fn cmd_parse(file: &Path, format: OutputFormat) -> Result<()> {
  let source = read_source(file)?;
  let build = parse_directives(&source);

  if format.is_json() {
    return print_json(&build);
  }

  if build.is_empty() {
    print_info("No directives found");
    return Ok(());
  }

  print_stat("cflags", &build.compile_flags().join(" "));
  print_stat("ldflags", &build.link_flags().join(" "));
  print_stat("args", &format!("{:?}", build.program_args()));
  Ok(())
}
