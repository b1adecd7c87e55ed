//! Build parameters sent by the client in `control.json`.

use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
  #[error("{0}")]
  Decode(#[from] serde_json::Error),

  #[error("invalid environment entry {0:?}, expected KEY=VALUE")]
  InvalidEnvironment(String),
}

/// Parameters for a single run of the build tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildControl {
  /// Export targets, passed as `--export <name>` in this order.
  #[serde(default)]
  pub exports: Vec<String>,

  /// `KEY=VALUE` pairs added to the build tool's environment.
  #[serde(default)]
  pub environments: Vec<String>,
}

impl BuildControl {
  /// Decode a control document and check that every environment entry is usable.
  pub fn from_reader<R: Read>(reader: R) -> Result<Self, ControlError> {
    let control: BuildControl = serde_json::from_reader(reader)?;
    for entry in &control.environments {
      if split_env(entry).is_none() {
        return Err(ControlError::InvalidEnvironment(entry.clone()));
      }
    }
    Ok(control)
  }

  /// Environment entries split at the first `=`.
  pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
    self.environments.iter().filter_map(|entry| split_env(entry))
  }
}

fn split_env(entry: &str) -> Option<(&str, &str)> {
  match entry.split_once('=') {
    Some((key, value)) if !key.is_empty() => Some((key, value)),
    _ => None,
  }
}
