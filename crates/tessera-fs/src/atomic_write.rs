use crate::{Error, Result};
use std::fs;
use std::path::Path;

const TMP_PREFIX: &str = ".";
const TMP_SUFFIX: &str = ".tmp";

#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicWriteOptions {
    sync: bool,
}

impl AtomicWriteOptions {
    pub fn new() -> Self { Self::default() }

    /// Flush the new content to disk before it replaces the old.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// Replace `path` with `content` so readers see either the old or the new
/// bytes, never a torn mix.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8], options: AtomicWriteOptions) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new(""));
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp_path = parent.join(format!("{TMP_PREFIX}{file_name}{TMP_SUFFIX}"));

    fs::write(&tmp_path, content).map_err(|e| Error::Write {
        path: tmp_path.clone(),
        offset: 0,
        source: e,
    })?;

    if options.sync {
        let file = fs::File::open(&tmp_path).map_err(|e| Error::Open {
            path: tmp_path.clone(),
            source: e,
        })?;
        file.sync_all().map_err(|e| Error::Write {
            path: tmp_path.clone(),
            offset: 0,
            source: e,
        })?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::Replace {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

pub fn atomic_read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| Error::Read {
        path: path.to_path_buf(),
        source: e,
    })
}
