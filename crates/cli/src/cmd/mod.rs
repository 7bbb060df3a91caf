mod parse;
mod run;
mod session;

pub use parse::cmd_parse;
pub use run::cmd_run;
pub use session::cmd_session;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ccell_lib::{CellOutcome, PipelineConfig};

/// Settings given on the command line. They take precedence over the config
/// file and the environment.
#[derive(Debug, Default)]
pub struct Overrides {
  pub config: Option<PathBuf>,
  pub cc: Option<String>,
  pub work_dir: Option<PathBuf>,
  pub launcher: Option<PathBuf>,
  pub timeout: Option<String>,
}

impl Overrides {
  pub fn load_config(&self) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(self.config.as_deref()).context("Failed to load configuration")?;
    self.apply(&mut config);
    Ok(config)
  }

  fn apply(&self, config: &mut PipelineConfig) {
    if let Some(cc) = &self.cc {
      config.compiler = cc.clone();
    }
    if let Some(dir) = &self.work_dir {
      config.work_dir = Some(dir.clone());
    }
    if let Some(launcher) = &self.launcher {
      config.launcher = Some(launcher.clone());
    }
    if let Some(timeout) = &self.timeout {
      config.timeout = Some(timeout.clone());
    }
  }
}

/// Read a cell or session file; `-` reads stdin.
fn read_source(file: &Path) -> Result<String> {
  if file == Path::new("-") {
    let mut source = String::new();
    std::io::stdin()
      .read_to_string(&mut source)
      .context("Failed to read source from stdin")?;
    return Ok(source);
  }
  std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Process exit code for a finished cell: the program's code, or 1 when the
/// cell did not compile.
fn cell_exit_code(outcome: &CellOutcome) -> i32 {
  match outcome {
    CellOutcome::CompileFailed { .. } => 1,
    CellOutcome::Completed { run, .. } => run.exit_code,
  }
}
