//! Test utilities for buildslot-lib.
//!
//! Helpers for assembling request archives byte by byte, including entries the
//! `tar` builder would refuse to write, and for installing a fake build tool.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType, Header};

/// Modification time stamped on every generated entry.
pub const TEST_MTIME: u64 = 1_600_000_000;

/// Header with `name` copied verbatim, bypassing the builder's path checks.
///
/// Names longer than the header field are cut; [`append_raw`] emits a GNU
/// long-name entry for those.
pub fn raw_header(name: &str, entry_type: EntryType, size: u64, mode: u32) -> Header {
  let mut header = Header::new_gnu();
  let bytes = &name.as_bytes()[..name.len().min(100)];
  header.as_gnu_mut().unwrap().name[..bytes.len()].copy_from_slice(bytes);
  header.set_entry_type(entry_type);
  header.set_size(size);
  header.set_mode(mode);
  header.set_mtime(TEST_MTIME);
  header.set_cksum();
  header
}

fn append_with_mode(builder: &mut Builder<Vec<u8>>, name: &str, entry_type: EntryType, mode: u32, content: &[u8]) {
  if name.len() > 100 {
    let mut long_name = name.as_bytes().to_vec();
    long_name.push(0);
    let header = raw_header("././@LongLink", EntryType::GNULongName, long_name.len() as u64, 0o644);
    builder.append(&header, &long_name[..]).unwrap();
  }
  let header = raw_header(name, entry_type, content.len() as u64, mode);
  builder.append(&header, content).unwrap();
}

pub fn append_raw(builder: &mut Builder<Vec<u8>>, name: &str, entry_type: EntryType, content: &[u8]) {
  append_with_mode(builder, name, entry_type, 0o644, content);
}

pub fn append_file(builder: &mut Builder<Vec<u8>>, name: &str, content: &[u8]) {
  append_raw(builder, name, EntryType::Regular, content);
}

pub fn append_dir(builder: &mut Builder<Vec<u8>>, name: &str) {
  append_with_mode(builder, name, EntryType::Directory, 0o755, b"");
}

/// Append a local PAX header that sets `mtime` for the following entry.
pub fn append_pax_mtime(builder: &mut Builder<Vec<u8>>, mtime: &str) {
  let body = format!(" mtime={}\n", mtime);
  // The length prefix counts itself.
  let mut len = body.len() + 1;
  while len.to_string().len() + body.len() != len {
    len += 1;
  }
  let record = format!("{}{}", len, body);
  append_raw(builder, "././@PaxHeader", EntryType::XHeader, record.as_bytes());
}

/// Append an old-GNU sparse entry of logical size `real_size` whose only data
/// is `data` at `offset`; everything else is a hole.
pub fn append_gnu_sparse(builder: &mut Builder<Vec<u8>>, name: &str, real_size: u64, offset: u64, data: &[u8]) {
  let mut header = raw_header(name, EntryType::GNUSparse, data.len() as u64, 0o644);
  {
    let gnu = header.as_gnu_mut().unwrap();
    gnu.realsize = octal12(real_size);
    gnu.sparse[0].offset = octal12(offset);
    gnu.sparse[0].numbytes = octal12(data.len() as u64);
    // Zero-length block at the end marks the trailing hole.
    gnu.sparse[1].offset = octal12(real_size);
    gnu.sparse[1].numbytes = octal12(0);
  }
  header.set_cksum();
  builder.append(&header, data).unwrap();
}

fn octal12(value: u64) -> [u8; 12] {
  let mut field = [0u8; 12];
  field[..11].copy_from_slice(format!("{:011o}", value).as_bytes());
  field
}

pub fn finish_tar(builder: Builder<Vec<u8>>) -> Vec<u8> {
  builder.into_inner().unwrap()
}

/// A complete build request: control, manifest, then whatever `store` appends.
pub fn request_tar(control: &str, manifest: &str, store: impl FnOnce(&mut Builder<Vec<u8>>)) -> Vec<u8> {
  let mut builder = Builder::new(Vec::new());
  append_file(&mut builder, "control.json", control.as_bytes());
  append_file(&mut builder, "manifest.json", manifest.as_bytes());
  store(&mut builder);
  finish_tar(builder)
}

/// Install an executable shell script standing in for the build tool.
pub fn write_tool(dir: &Path, script: &str) -> PathBuf {
  let path = dir.join("fake-tool");
  std::fs::write(&path, script).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
