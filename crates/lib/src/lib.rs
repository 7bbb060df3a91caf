//! ccell-lib: compile and run C cells with streamed output.
//!
//! This crate provides the pieces a notebook-style host needs to turn a cell
//! of C source into a running program:
//! - `directive`: build flags and program arguments embedded in the source
//! - `process`: child processes whose stdout/stderr are forwarded as they arrive
//! - `loader` and `stub`: the launcher that loads a compiled unit and calls `run`
//! - `pipeline`: parse, compile, run, and clean up, one cell at a time

pub mod artifact;
pub mod config;
pub mod consts;
pub mod directive;
pub mod loader;
pub mod pipeline;
pub mod process;
pub mod sink;
pub mod stub;
pub mod util;

pub use config::PipelineConfig;
pub use directive::{BuildConfig, parse_directives};
pub use pipeline::{CellOutcome, Pipeline, PipelineError, PipelineState};
pub use sink::{CapturedOutput, OutputKind, OutputSink};
