//! Command lines for the compile and run steps.

use std::path::Path;

use crate::config::PipelineConfig;
use crate::directive::BuildConfig;
use crate::process::CommandLine;

/// `<cc> <source> -std=<std> -fPIC -shared -rdynamic <cflags> -o <unit> <ldflags>`
pub fn compile_command(config: &PipelineConfig, build: &BuildConfig, source: &Path, unit: &Path) -> CommandLine {
  CommandLine::new(&config.compiler)
    .arg(source)
    .arg(config.std_flag())
    .args(["-fPIC", "-shared", "-rdynamic"])
    .args(build.compile_flags())
    .arg("-o")
    .arg(unit)
    .args(build.link_flags())
}

/// `<stub> <unit> <args>`
pub fn run_command(stub: &Path, build: &BuildConfig, unit: &Path) -> CommandLine {
  CommandLine::new(stub).arg(unit).args(build.program_args())
}
