//! Hole-preserving file copy for sparse tar entries.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Granularity at which holes are detected.
pub const SPARSE_CHUNK_SIZE: usize = 1024;

/// Copy `src` into `dst`, seeking over chunks that are entirely zero.
///
/// Holes shorter than [`SPARSE_CHUNK_SIZE`] or not aligned to it are written
/// out as zeros. The destination must already have its final length, since a
/// trailing hole only moves the cursor. Returns the number of bytes consumed
/// from `src`.
pub fn copy_sparse<R: Read, W: Write + Seek>(src: &mut R, dst: &mut W) -> io::Result<u64> {
  let mut buf = [0u8; SPARSE_CHUNK_SIZE];
  let mut copied = 0u64;

  loop {
    let n = read_chunk(src, &mut buf)?;
    if n == 0 {
      break;
    }

    let chunk = &buf[..n];
    if chunk.iter().all(|&b| b == 0) {
      dst.seek(SeekFrom::Current(n as i64))?;
    } else {
      dst.write_all(chunk)?;
    }
    copied += n as u64;
  }

  Ok(copied)
}

/// Size `file` to `size` bytes and fill it from `src`, keeping holes unallocated.
pub fn reconstruct_sparse<R: Read>(src: &mut R, file: &mut File, size: u64) -> io::Result<u64> {
  file.set_len(size)?;
  copy_sparse(src, file)
}

/// Fill `buf` as far as possible; short only at end of stream.
fn read_chunk<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
  let mut filled = 0;
  while filled < buf.len() {
    match src.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    }
  }
  Ok(filled)
}
