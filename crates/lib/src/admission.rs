//! Single-build admission.
//!
//! The service runs at most one build for its whole lifetime. Whoever claims
//! the build slot owns the build directory; the slot is never given back.

use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::warn;

use crate::consts::BUILD_DIR_NAME;

#[derive(Debug, Error)]
pub enum AdmissionError {
  #[error("build already started")]
  AlreadyBuilding,

  #[error("cannot create build base dir: {0}")]
  CreateBase(#[source] io::Error),

  #[error("cannot create build dir: {0}")]
  CreateDir(#[source] io::Error),
}

/// Grants the build slot to at most one caller.
pub trait Admission: Send + Sync {
  /// Claim the slot and return the directory the build may fill.
  ///
  /// Fails with [`AdmissionError::AlreadyBuilding`] without blocking when
  /// the slot is taken.
  fn acquire(&self) -> Result<PathBuf, AdmissionError>;
}

/// Uses the existence of `<base>/build` as the lock.
///
/// A single `mkdir` decides the race, so concurrent requests, and even
/// concurrent processes sharing a base directory, never both win.
#[derive(Debug, Clone)]
pub struct DirectoryAdmission {
  base: PathBuf,
}

impl DirectoryAdmission {
  pub fn new(base: PathBuf) -> Self {
    Self { base }
  }

  pub fn build_dir(&self) -> PathBuf {
    self.base.join(BUILD_DIR_NAME)
  }
}

impl Admission for DirectoryAdmission {
  fn acquire(&self) -> Result<PathBuf, AdmissionError> {
    DirBuilder::new()
      .recursive(true)
      .mode(0o700)
      .create(&self.base)
      .map_err(AdmissionError::CreateBase)?;

    let build_dir = self.build_dir();
    match DirBuilder::new().mode(0o700).create(&build_dir) {
      Ok(()) => Ok(build_dir),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
        warn!(build_dir = %build_dir.display(), "build directory exists, refusing second build");
        Err(AdmissionError::AlreadyBuilding)
      }
      Err(e) => Err(AdmissionError::CreateDir(e)),
    }
  }
}

/// In-process slot for embedding and tests.
///
/// Hands out a directory the caller prepared; the filesystem is not touched.
#[derive(Debug)]
pub struct MemoryAdmission {
  build_dir: PathBuf,
  taken: AtomicBool,
}

impl MemoryAdmission {
  pub fn new(build_dir: PathBuf) -> Self {
    Self {
      build_dir,
      taken: AtomicBool::new(false),
    }
  }

  pub fn is_taken(&self) -> bool {
    self.taken.load(Ordering::Acquire)
  }
}

impl Admission for MemoryAdmission {
  fn acquire(&self) -> Result<PathBuf, AdmissionError> {
    self
      .taken
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .map(|_| self.build_dir.clone())
      .map_err(|_| AdmissionError::AlreadyBuilding)
  }
}
