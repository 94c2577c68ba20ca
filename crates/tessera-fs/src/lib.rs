//! Filesystem primitives for segmented downloads.
//!
//! - `positioned.rs` - Offset-addressed writes into one shared output file
//! - `atomic_write.rs` - Whole-file replacement for small sidecar records
//! - helpers below for companion-file bookkeeping

mod atomic_write;
mod error;
mod positioned;

pub use atomic_write::{atomic_read, atomic_write, AtomicWriteOptions};
pub use error::{Error, Result};
pub use positioned::PositionedFile;

use std::io::ErrorKind;
use std::path::Path;

/// Length of the file at `path`, or `None` when it does not exist.
pub fn existing_len(path: impl AsRef<Path>) -> Result<Option<u64>> {
    let path = path.as_ref();
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).map_err(|e| Error::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn remove_file_if_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

pub fn remove_dir_if_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
