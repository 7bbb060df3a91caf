//! Implementation of the `ccell run` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use ccell_lib::Pipeline;

use super::{Overrides, cell_exit_code, read_source};
use crate::output::TerminalSink;

/// Compile and run one cell, streaming its output to the terminal.
///
/// Returns the program's exit code, or 1 if the cell did not compile.
pub fn cmd_run(file: &Path, overrides: &Overrides) -> Result<i32> {
  let source = read_source(file)?;
  let config = overrides.load_config()?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    let pipeline = Pipeline::init(config).await.context("Failed to initialize pipeline")?;
    info!(stub = %pipeline.stub().path().display(), "pipeline ready");

    let mut sink = TerminalSink::new();
    let result = pipeline.run_cell(&source, &mut sink).await;
    pipeline.teardown();

    let outcome = result.context("Cell failed")?;
    Ok(cell_exit_code(&outcome))
  })
}
