//! Admission checks for tar entries, applied before anything touches disk.

use tar::EntryType;

use super::ArchiveError;
use crate::consts::{STORE_DIR, STORE_PREFIX};

/// Lexically canonicalize a slash-separated path.
///
/// Repeated separators and `.` segments are dropped, `..` removes the
/// preceding segment, and a trailing separator is stripped. Leading `..`
/// segments of a relative path are kept since there is nothing to resolve
/// them against.
pub fn clean_path(path: &str) -> String {
  let rooted = path.starts_with('/');
  let mut parts: Vec<&str> = Vec::new();

  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => match parts.last() {
        Some(&last) if last != ".." => {
          parts.pop();
        }
        _ if rooted => {}
        _ => parts.push(".."),
      },
      _ => parts.push(segment),
    }
  }

  let joined = parts.join("/");
  match (rooted, joined.is_empty()) {
    (true, _) => format!("/{}", joined),
    (false, true) => ".".to_string(),
    (false, false) => joined,
  }
}

/// Check that a store entry's name is canonical and under `store/`.
///
/// Returns the canonical path on success. Directory entries conventionally
/// carry one trailing `/`, which does not count against cleanliness.
pub fn validate_store_name(raw: &str, entry_type: EntryType) -> Result<String, ArchiveError> {
  let clean = clean_path(raw);
  let expected = raw.strip_suffix('/').unwrap_or(raw);

  if clean != expected {
    return Err(ArchiveError::NotClean {
      clean,
      raw: raw.to_string(),
    });
  }

  let is_store_root = clean == STORE_DIR && entry_type == EntryType::Directory;
  if !clean.starts_with(STORE_PREFIX) && !is_store_root {
    return Err(ArchiveError::NoStorePrefix(clean));
  }

  Ok(clean)
}

/// Only plain files, directories and sparse files may be materialized.
pub fn validate_entry_type(entry_type: EntryType) -> Result<(), ArchiveError> {
  match entry_type {
    EntryType::Regular | EntryType::Directory | EntryType::GNUSparse => Ok(()),
    other => Err(ArchiveError::UnsupportedType(other)),
  }
}

/// Check one of the fixed leading entries by exact name.
pub fn expect_entry_name(expected: &'static str, got: &str) -> Result<(), ArchiveError> {
  if got != expected {
    return Err(ArchiveError::UnexpectedEntry {
      expected,
      got: got.to_string(),
    });
  }
  Ok(())
}
