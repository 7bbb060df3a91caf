mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{Overrides, cmd_parse, cmd_run, cmd_session};
use output::{OutputFormat, print_error};

/// ccell - compile and run C cells with streamed output
#[derive(Parser)]
#[command(name = "ccell")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Config file (default: $XDG_CONFIG_HOME/ccell/config.toml when present)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// C compiler used for cells and the loader stub
  #[arg(long, global = true, value_name = "CC")]
  cc: Option<String>,

  /// Directory for temporary artifacts
  #[arg(long, global = true, value_name = "DIR")]
  work_dir: Option<PathBuf>,

  /// Prebuilt launcher to use instead of compiling the native stub
  #[arg(long, global = true, value_name = "PATH")]
  launcher: Option<PathBuf>,

  /// Time limit per compile or run step (e.g. "30s", "2m")
  #[arg(long, global = true, value_name = "DURATION", value_parser = parse_timeout)]
  timeout: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile and run a single cell
  Run {
    /// C source file, or "-" for stdin
    file: PathBuf,
  },

  /// Run a file of cells separated by `//%%` lines
  Session {
    /// Session file, or "-" for stdin
    file: PathBuf,

    /// Continue with the next cell after a failure
    #[arg(short, long)]
    keep_going: bool,
  },

  /// Show the build directives of a cell
  Parse {
    /// C source file, or "-" for stdin
    file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn parse_timeout(value: &str) -> Result<String, String> {
  humantime::parse_duration(value)
    .map(|_| value.to_string())
    .map_err(|e| e.to_string())
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let overrides = Overrides {
    config: cli.config,
    cc: cli.cc,
    work_dir: cli.work_dir,
    launcher: cli.launcher,
    timeout: cli.timeout,
  };

  let result = match cli.command {
    Commands::Run { file } => cmd_run(&file, &overrides),
    Commands::Session { file, keep_going } => cmd_session(&file, keep_going, &overrides),
    Commands::Parse { file, format } => cmd_parse(&file, format).map(|()| 0),
  };

  match result {
    Ok(code) => std::process::exit(code),
    Err(e) => {
      print_error(&format!("{e:#}"));
      std::process::exit(1);
    }
  }
}
