//! Pipeline configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Hosts apply their own overrides (command line
//! flags) on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::APP_NAME;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid timeout {value:?}: {message}")]
  InvalidTimeout { value: String, message: String },
}

/// Settings shared by every cell a pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
  /// C compiler used for cells and for the native loader stub.
  pub compiler: String,
  /// Language standard passed as `-std=<std>`.
  pub std: String,
  /// Directory for temporary artifacts. Defaults to the system temp dir.
  pub work_dir: Option<PathBuf>,
  /// Prebuilt launcher to use instead of compiling the native stub.
  pub launcher: Option<PathBuf>,
  /// Per-process time limit, in humantime form (`"30s"`, `"2m"`).
  pub timeout: Option<String>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      compiler: "cc".to_string(),
      std: "c11".to_string(),
      work_dir: None,
      launcher: None,
      timeout: None,
    }
  }
}

impl PipelineConfig {
  /// Load configuration from `file` (when given) and the environment.
  ///
  /// Without an explicit file, [`default_config_path`] is used if it exists.
  pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match file {
      Some(path) => Self::from_file(path)?,
      None => {
        let path = default_config_path();
        if path.is_file() {
          Self::from_file(&path)?
        } else {
          Self::default()
        }
      }
    };
    config.apply_env();
    config.timeout()?;
    Ok(config)
  }

  /// Parse a TOML config file.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    debug!(path = %path.display(), "loading config file");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Override fields from `CCELL_*` variables (and `CC` for the compiler).
  pub fn apply_env(&mut self) {
    if let Some(cc) = env_var("CCELL_CC").or_else(|| env_var("CC")) {
      self.compiler = cc;
    }
    if let Some(dir) = env_var("CCELL_WORK_DIR") {
      self.work_dir = Some(PathBuf::from(dir));
    }
    if let Some(launcher) = env_var("CCELL_LAUNCHER") {
      self.launcher = Some(PathBuf::from(launcher));
    }
    if let Some(timeout) = env_var("CCELL_TIMEOUT") {
      self.timeout = Some(timeout);
    }
  }

  /// Directory where temporary artifacts are created.
  pub fn work_dir(&self) -> PathBuf {
    self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
  }

  /// The `-std=` flag for the compile and stub build commands.
  pub fn std_flag(&self) -> String {
    format!("-std={}", self.std)
  }

  /// Parsed time limit, if one is configured.
  pub fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
    self
      .timeout
      .as_deref()
      .map(|value| {
        humantime::parse_duration(value).map_err(|e| ConfigError::InvalidTimeout {
          value: value.to_string(),
          message: e.to_string(),
        })
      })
      .transpose()
  }
}

/// `$XDG_CONFIG_HOME/ccell/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> PathBuf {
  let config_home = std::env::var_os("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    .unwrap_or_else(|| PathBuf::from(".config"));
  config_home.join(APP_NAME).join("config.toml")
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
