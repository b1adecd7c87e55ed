//! Populating a build directory from a request tar stream.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tar::{Archive, Entries, Entry, EntryType};
use tracing::{debug, info};

use super::sparse::reconstruct_sparse;
use super::validate::{expect_entry_name, validate_entry_type, validate_store_name};
use super::{ArchiveError, IngestError};
use crate::admission::Admission;
use crate::consts::{CONTROL_ENTRY, MANIFEST_ENTRY, MANIFEST_FILENAME, STORE_DIR};
use crate::control::BuildControl;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// A request that passed ingestion and now owns the build directory.
#[derive(Debug, Clone)]
pub struct IngestedBuild {
  pub control: BuildControl,
  pub build_dir: PathBuf,
}

/// Read a whole build request from `reader`.
///
/// The control document is decoded before the build slot is requested, so a
/// malformed request never takes the slot. Once admitted, any failure leaves
/// the build directory as far as it got.
pub fn ingest_archive<R: Read>(reader: R, admission: &dyn Admission) -> Result<IngestedBuild, IngestError> {
  let mut archive = Archive::new(reader);
  let mut entries = archive
    .entries()
    .map_err(|source| IngestError::Control(ArchiveError::Read { name: CONTROL_ENTRY, source }))?;

  let control = read_control(&mut entries).map_err(IngestError::Control)?;

  let build_dir = admission.acquire()?;
  info!(build_dir = %build_dir.display(), exports = ?control.exports, "build admitted");

  write_manifest(&mut entries, &build_dir).map_err(IngestError::Manifest)?;

  fs::create_dir_all(build_dir.join(STORE_DIR))
    .map_err(|source| ArchiveError::Write {
      name: STORE_DIR.to_string(),
      source,
    })
    .map_err(IngestError::Sources)?;
  unpack_sources(entries, &build_dir).map_err(IngestError::Sources)?;

  Ok(IngestedBuild { control, build_dir })
}

fn read_control<R: Read>(entries: &mut Entries<'_, R>) -> Result<BuildControl, ArchiveError> {
  let mut entry = next_fixed_entry(entries, CONTROL_ENTRY)?;
  Ok(BuildControl::from_reader(&mut entry)?)
}

fn write_manifest<R: Read>(entries: &mut Entries<'_, R>, build_dir: &Path) -> Result<(), ArchiveError> {
  let mut entry = next_fixed_entry(entries, MANIFEST_ENTRY)?;
  let write_err = |source| ArchiveError::Write {
    name: MANIFEST_FILENAME.to_string(),
    source,
  };

  let mut file = File::create(build_dir.join(MANIFEST_FILENAME)).map_err(write_err)?;
  io::copy(&mut entry, &mut file).map_err(write_err)?;
  Ok(())
}

/// Pull the next entry and insist on its exact name.
fn next_fixed_entry<'a, R: Read>(entries: &mut Entries<'a, R>, name: &'static str) -> Result<Entry<'a, R>, ArchiveError> {
  let entry = match entries.next() {
    Some(entry) => entry.map_err(|source| ArchiveError::Read { name, source })?,
    None => return Err(ArchiveError::Missing(name)),
  };

  expect_entry_name(name, &entry_name(&entry)?)?;
  let entry_type = entry.header().entry_type();
  if entry_type != EntryType::Regular {
    return Err(ArchiveError::UnsupportedType(entry_type));
  }
  Ok(entry)
}

/// Materialize the remaining `store/` entries under `dest`.
///
/// Stops at the first entry that fails validation or cannot be written.
/// An archive with no further entries is fine.
pub fn unpack_sources<R: Read>(entries: Entries<'_, R>, dest: &Path) -> Result<(), ArchiveError> {
  let mut count = 0usize;

  for entry in entries {
    let mut entry = entry.map_err(ArchiveError::Next)?;
    let raw = entry_name(&entry)?;
    let entry_type = entry.header().entry_type();

    let name = validate_store_name(&raw, entry_type)?;
    validate_entry_type(entry_type)?;

    let target = dest.join(&name);
    let write_err = |source| ArchiveError::Write {
      name: name.clone(),
      source,
    };

    match entry_type {
      EntryType::Directory => {
        let mode = entry.header().mode().unwrap_or(DEFAULT_DIR_MODE);
        create_dir(&target, mode).map_err(write_err)?;
      }
      EntryType::GNUSparse => {
        let size = sparse_size(&entry).map_err(|source| ArchiveError::SparseHeader {
          name: name.clone(),
          source,
        })?;
        let mut file = create_file(&target, entry.header().mode().unwrap_or(DEFAULT_FILE_MODE)).map_err(write_err)?;
        reconstruct_sparse(&mut entry, &mut file, size).map_err(write_err)?;
      }
      _ => {
        let mut file = create_file(&target, entry.header().mode().unwrap_or(DEFAULT_FILE_MODE)).map_err(write_err)?;
        io::copy(&mut entry, &mut file).map_err(write_err)?;
      }
    }

    let (atime, mtime) = entry_times(&mut entry);
    filetime::set_file_times(&target, atime, mtime).map_err(write_err)?;

    debug!(name = %name, entry_type = ?entry_type, "unpacked store entry");
    count += 1;
  }

  debug!(count, "store section unpacked");
  Ok(())
}

/// The raw header name. Names that are not UTF-8 are refused rather than
/// rewritten, so what lands on disk is always the name the client sent.
fn entry_name<R: Read>(entry: &Entry<'_, R>) -> Result<String, ArchiveError> {
  let bytes = entry.path_bytes();
  match std::str::from_utf8(&bytes) {
    Ok(name) => Ok(name.to_string()),
    Err(_) => Err(ArchiveError::NonUtf8Name(String::from_utf8_lossy(&bytes).into_owned())),
  }
}

/// Directories always stay writable for their owner so later entries can land in them.
fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
  DirBuilder::new().recursive(true).mode((mode & 0o777) | 0o700).create(path)
}

fn create_file(path: &Path, mode: u32) -> io::Result<File> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .mode(mode & 0o777)
    .open(path)
}

/// Logical size of a GNU sparse entry, holes included.
fn sparse_size<R: Read>(entry: &Entry<'_, R>) -> io::Result<u64> {
  entry
    .header()
    .as_gnu()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "sparse entry without GNU header"))?
    .real_size()
}

/// Access and modification times for an entry.
///
/// PAX records win over header fields. Without any access time the
/// modification time is used for both.
fn entry_times<R: Read>(entry: &mut Entry<'_, R>) -> (FileTime, FileTime) {
  let header = entry.header();
  let mut mtime = FileTime::from_unix_time(header.mtime().unwrap_or(0) as i64, 0);
  let mut atime = header
    .as_gnu()
    .and_then(|gnu| gnu.atime().ok())
    .filter(|&secs| secs != 0)
    .map(|secs| FileTime::from_unix_time(secs as i64, 0));

  if let Ok(Some(extensions)) = entry.pax_extensions() {
    for extension in extensions.flatten() {
      let (Ok(key), Ok(value)) = (extension.key(), extension.value()) else {
        continue;
      };
      match key {
        "mtime" => mtime = parse_pax_time(value).unwrap_or(mtime),
        "atime" => atime = parse_pax_time(value).or(atime),
        _ => {}
      }
    }
  }

  (atime.unwrap_or(mtime), mtime)
}

/// Parse a PAX timestamp such as `1700000000.123456789`.
fn parse_pax_time(value: &str) -> Option<FileTime> {
  let (secs, fraction) = value.split_once('.').unwrap_or((value, ""));
  let secs: i64 = secs.parse().ok()?;
  let digits: String = fraction.chars().take(9).collect();
  let nanos: u32 = if digits.is_empty() {
    0
  } else {
    format!("{:0<9}", digits).parse().ok()?
  };
  Some(FileTime::from_unix_time(secs, nanos))
}
