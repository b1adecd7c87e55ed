//! Service configuration.
//!
//! Values are resolved in three layers: built-in defaults, an optional JSON
//! config file, then `BUILDSLOT_*` environment variables. The CLI applies its
//! flags on top of the result.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{APP_NAME, BUILD_DIR_NAME, DEFAULT_LISTEN, DEFAULT_TOOL, RESULT_FILENAME};

pub const ENV_LISTEN: &str = "BUILDSLOT_LISTEN";
pub const ENV_BUILD_DIR_BASE: &str = "BUILDSLOT_BUILD_DIR_BASE";
pub const ENV_TOOL: &str = "BUILDSLOT_TOOL";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid {var} value {value:?}: {message}")]
  InvalidEnv {
    var: &'static str,
    value: String,
    message: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Address the HTTP server binds to.
  pub listen: SocketAddr,

  /// Directory holding the build directory and the result marker.
  pub build_dir_base: PathBuf,

  /// Build tool binary, resolved through `PATH` when not absolute.
  pub tool: PathBuf,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      listen: DEFAULT_LISTEN.parse().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8001))),
      build_dir_base: std::env::temp_dir().join(APP_NAME),
      tool: PathBuf::from(DEFAULT_TOOL),
    }
  }
}

impl Config {
  /// Load a config file. Missing fields keep their defaults.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load from `path` if given, otherwise start from defaults, then apply
  /// environment overrides.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None => Self::default(),
    };
    config.apply_env()?;
    Ok(config)
  }

  /// Override fields from `BUILDSLOT_*` environment variables.
  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(ENV_LISTEN) {
      self.listen = value.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidEnv {
        var: ENV_LISTEN,
        value: value.clone(),
        message: e.to_string(),
      })?;
    }
    if let Ok(value) = std::env::var(ENV_BUILD_DIR_BASE) {
      self.build_dir_base = PathBuf::from(value);
    }
    if let Ok(value) = std::env::var(ENV_TOOL) {
      self.tool = PathBuf::from(value);
    }
    Ok(())
  }

  /// The one directory a build may occupy.
  pub fn build_dir(&self) -> PathBuf {
    self.build_dir_base.join(BUILD_DIR_NAME)
  }

  /// Where the outcome of the build is recorded.
  pub fn result_path(&self) -> PathBuf {
    self.build_dir_base.join(RESULT_FILENAME)
  }
}
