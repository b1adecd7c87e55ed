//! Build request ingestion.
//!
//! A build request is a tar stream laid out as:
//!
//! ```text
//! control.json          # BuildControl, always first
//! manifest.json         # opaque build manifest, always second
//! store/...             # optional content-addressed sources
//! ```
//!
//! Every store entry is validated before it is written, see [`validate`].

pub mod sparse;
pub mod unpack;
pub mod validate;

use std::io;

use tar::EntryType;
use thiserror::Error;

use crate::admission::AdmissionError;
use crate::control::ControlError;

pub use unpack::{IngestedBuild, ingest_archive, unpack_sources};

/// Errors raised while reading or materializing tar entries.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("cannot read tar {name}: {source}")]
  Read {
    name: &'static str,
    #[source]
    source: io::Error,
  },

  #[error("cannot read tar {0}: unexpected end of archive")]
  Missing(&'static str),

  #[error("expected tar {expected}, got {got}")]
  UnexpectedEntry { expected: &'static str, got: String },

  #[error("cannot decode control.json: {0}")]
  Control(#[from] ControlError),

  #[error("name not clean: {clean} != {raw}")]
  NotClean { clean: String, raw: String },

  #[error("name not utf-8: {0}")]
  NonUtf8Name(String),

  #[error("expected store/ prefix, got {0}")]
  NoStorePrefix(String),

  #[error("unsupported tar type {0:?}")]
  UnsupportedType(EntryType),

  #[error("cannot read tar entry: {0}")]
  Next(#[source] io::Error),

  #[error("invalid sparse header for {name}: {source}")]
  SparseHeader {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("cannot write {name}: {source}")]
  Write {
    name: String,
    #[source]
    source: io::Error,
  },
}

/// Failure of a whole ingestion, tagged with the stage it happened in.
///
/// Only [`IngestError::Manifest`] and [`IngestError::Sources`] happen after the
/// build slot was taken.
#[derive(Debug, Error)]
pub enum IngestError {
  #[error(transparent)]
  Control(ArchiveError),

  #[error(transparent)]
  Admission(#[from] AdmissionError),

  #[error(transparent)]
  Manifest(ArchiveError),

  #[error(transparent)]
  Sources(ArchiveError),

  #[error("ingest task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl IngestError {
  /// Whether the failure happened while holding the build slot.
  pub fn is_admitted(&self) -> bool {
    matches!(self, IngestError::Manifest(_) | IngestError::Sources(_))
  }
}
