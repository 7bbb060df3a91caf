//! Implementation of the `ccell session` command.
//!
//! A session file holds several cells separated by lines starting with
//! `//%%`. All cells run in order on one pipeline, so the loader stub is
//! built once.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use ccell_lib::Pipeline;
use ccell_lib::consts::CELL_SEPARATOR;

use super::{Overrides, cell_exit_code, read_source};
use crate::output::{TerminalSink, print_cell_header, print_cell_summary, print_error, print_warning};

/// Run every cell in `file` and return the exit code of the last one run.
///
/// Without `keep_going`, the session stops at the first cell that fails to
/// compile, exits nonzero, or cannot be started.
pub fn cmd_session(file: &Path, keep_going: bool, overrides: &Overrides) -> Result<i32> {
  let source = read_source(file)?;
  let cells = split_cells(&source);
  if cells.is_empty() {
    print_warning("No cells to run");
    return Ok(0);
  }
  let config = overrides.load_config()?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    let pipeline = Pipeline::init(config).await.context("Failed to initialize pipeline")?;
    let mut sink = TerminalSink::new();
    let mut last = 0;

    for (index, cell) in cells.iter().enumerate() {
      let number = index + 1;
      print_cell_header(number, cells.len());
      let started = Instant::now();

      match pipeline.run_cell(cell, &mut sink).await {
        Ok(outcome) => {
          last = cell_exit_code(&outcome);
          print_cell_summary(number, last, started.elapsed());
        }
        Err(e) if keep_going => {
          print_error(&format!("Cell {number} failed: {e}"));
          last = 1;
        }
        Err(e) => {
          pipeline.teardown();
          return Err(e).with_context(|| format!("Cell {number} failed"));
        }
      }

      if last != 0 && !keep_going {
        debug!(cell = number, exit_code = last, "stopping session");
        break;
      }
    }

    pipeline.teardown();
    Ok(last)
  })
}

/// Split a session into cells. Blank cells are dropped.
pub fn split_cells(source: &str) -> Vec<String> {
  let mut cells = Vec::new();
  let mut current = String::new();

  for line in source.split_inclusive('\n') {
    if line.starts_with(CELL_SEPARATOR) {
      cells.push(std::mem::take(&mut current));
    } else {
      current.push_str(line);
    }
  }
  cells.push(current);

  cells.retain(|cell| !cell.trim().is_empty());
  cells
}
