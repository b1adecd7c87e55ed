//! Error types for running and packaging a build.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors raised after a build was accepted.
///
/// By the time these happen the client already received `201 Created`, so
/// they end up on the transcript and in the result marker rather than in an
/// HTTP status.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("cannot create log file: {0}")]
  LogFile(#[source] io::Error),

  #[error("cannot write build log: {0}")]
  Log(#[source] io::Error),

  #[error("cannot create output dir: {0}")]
  OutputDir(#[source] io::Error),

  #[error("cannot start {tool}: {source}")]
  Spawn {
    tool: String,
    #[source]
    source: io::Error,
  },

  #[error("cannot read {stream} of {tool}: {source}")]
  Pipe {
    tool: String,
    stream: &'static str,
    #[source]
    source: io::Error,
  },

  #[error("cannot wait for {tool}: {source}")]
  Wait {
    tool: String,
    #[source]
    source: io::Error,
  },

  #[error("{tool} failed: {status}")]
  ToolFailed { tool: String, status: ExitStatus },

  #[error("cannot package output: {0}")]
  Package(#[source] io::Error),

  #[error("cannot package output: tar {status}: {output}")]
  PackageFailed { status: ExitStatus, output: String },
}
