//! The persisted outcome of the one build this service runs.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

/// Marker format version.
pub const RESULT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ResultError {
  #[error("cannot read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("cannot write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot encode build result: {0}")]
  Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
  Success,
  Failure,
}

/// Content of `result.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
  pub version: u32,
  pub status: BuildStatus,
  /// Error text of a failed attempt.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Completion time, seconds since the Unix epoch.
  pub finished_at_unix: u64,
}

impl BuildResult {
  pub fn success() -> Self {
    Self {
      version: RESULT_VERSION,
      status: BuildStatus::Success,
      error: None,
      finished_at_unix: now_unix(),
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      version: RESULT_VERSION,
      status: BuildStatus::Failure,
      error: Some(message.into()),
      finished_at_unix: now_unix(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == BuildStatus::Success
  }

  pub fn finished_at(&self) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_secs(self.finished_at_unix)
  }
}

/// Write the marker through a temporary file so readers never see a partial document.
pub async fn write_result(path: &Path, result: &BuildResult) -> Result<(), ResultError> {
  let content = serde_json::to_string(result)?;
  let tmp = path.with_extension("json.tmp");
  tokio::fs::write(&tmp, format!("{}\n", content))
    .await
    .map_err(|source| ResultError::Write {
      path: tmp.clone(),
      source,
    })?;
  tokio::fs::rename(&tmp, path)
    .await
    .map_err(|source| ResultError::Write {
      path: path.to_path_buf(),
      source,
    })
}

/// Read the marker. Returns `None` if no build has finished yet.
pub fn read_result(path: &Path) -> Result<Option<BuildResult>, ResultError> {
  match std::fs::read_to_string(path) {
    Ok(content) => parse_result(path, &content).map(Some),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(source) => Err(ResultError::Read {
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// [`read_result`] for async callers.
pub async fn load_result(path: &Path) -> Result<Option<BuildResult>, ResultError> {
  match tokio::fs::read_to_string(path).await {
    Ok(content) => parse_result(path, &content).map(Some),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(source) => Err(ResultError::Read {
      path: path.to_path_buf(),
      source,
    }),
  }
}

fn parse_result(path: &Path, content: &str) -> Result<BuildResult, ResultError> {
  serde_json::from_str(content).map_err(|source| ResultError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

/// Persist `result`, logging instead of failing.
///
/// The client has already been told the outcome by the time this runs.
pub async fn record_result(path: &Path, result: &BuildResult) {
  match write_result(path, result).await {
    Ok(()) => info!(path = %path.display(), status = ?result.status, "build result recorded"),
    Err(e) => error!(path = %path.display(), error = %e, "cannot record build result"),
  }
}

fn now_unix() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default()
}
