//! Offset-addressed writes into a shared output file.
//!
//! Every write names its own offset, so callers never share a cursor and the
//! final byte order does not depend on the order writes are issued in.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const COPY_BUF_LEN: usize = 256 * 1024;

#[derive(Debug)]
pub struct PositionedFile {
    file: File,
    path: PathBuf,
}

impl PositionedFile {
    /// Open (creating if needed) `path` for positioned writes.
    ///
    /// With `truncate` set, any previous content is dropped.
    pub fn open(path: impl AsRef<Path>, truncate: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(path)
            .map_err(|e| Error::Open {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn write_all_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        write_all_at(&self.file, buf, offset).map_err(|e| Error::Write {
            path: self.path.clone(),
            offset,
            source: e,
        })
    }

    /// Copy the whole of `src` into this file starting at `offset`.
    ///
    /// Fails with [`Error::LengthMismatch`] when `src` does not hold exactly
    /// `expected_len` bytes; nothing past `offset + expected_len` is touched.
    pub fn copy_from(&self, src: impl AsRef<Path>, offset: u64, expected_len: u64) -> Result<u64> {
        let src = src.as_ref();
        let mut reader = File::open(src).map_err(|e| Error::Open {
            path: src.to_path_buf(),
            source: e,
        })?;

        let actual = reader
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::Read {
                path: src.to_path_buf(),
                source: e,
            })?;
        if actual != expected_len {
            return Err(Error::LengthMismatch {
                path: src.to_path_buf(),
                expected: expected_len,
                actual,
            });
        }

        let mut buf = vec![0u8; COPY_BUF_LEN];
        let mut copied = 0u64;
        loop {
            let n = reader.read(&mut buf).map_err(|e| Error::Read {
                path: src.to_path_buf(),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            self.write_all_at(&buf[..n], offset + copied)?;
            copied += n as u64;
        }

        if copied != expected_len {
            return Err(Error::LengthMismatch {
                path: src.to_path_buf(),
                expected: expected_len,
                actual: copied,
            });
        }
        Ok(copied)
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        self.file.set_len(len).map_err(|e| Error::Write {
            path: self.path.clone(),
            offset: len,
            source: e,
        })
    }

    pub fn sync_all(&self) -> Result<()> {
        self.file.sync_all().map_err(|e| Error::Write {
            path: self.path.clone(),
            offset: 0,
            source: e,
        })
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
