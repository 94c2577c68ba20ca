//! On-disk resume bookkeeping next to the output file.
//!
//! ```text
//! <output>.tessera/
//!     manifest.json   url, total, partition policy, merged range indexes
//!     part-<index>    bytes fetched so far for that range
//! ```
//!
//! The manifest outlives a successful run with every range marked merged, so
//! running the same download again finds nothing left to fetch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_fs::{AtomicWriteOptions, atomic_read, atomic_write, ensure_dir, remove_dir_if_exists};
use tracing::debug;

use crate::core::Policy;
use crate::error::WriteError;

const SIDECAR_SUFFIX: &str = ".tessera";
const MANIFEST_FILE: &str = "manifest.json";

/// Persisted description of a run, checked before its parts are reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub url:    String,
    pub total:  Option<u64>,
    /// How `total` was cut into ranges; `None` when the length is unknown.
    pub policy: Option<Policy>,
    #[serde(default, with = "runs")]
    pub merged: BTreeSet<u32>,
}

impl Manifest {
    pub fn new(url: &str, total: Option<u64>, policy: Option<Policy>) -> Self {
        Self {
            url: url.to_string(),
            total,
            policy,
            merged: BTreeSet::new(),
        }
    }

    /// Whether parts recorded under this manifest belong to the given run.
    pub fn describes(&self, url: &str, total: Option<u64>, policy: Option<Policy>) -> bool {
        self.url == url && self.total == total && self.policy == policy
    }
}

/// Merged indexes stored as inclusive `[first, last]` runs, so a finished
/// download of any size records a single pair.
mod runs {
    use std::collections::BTreeSet;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(merged: &BTreeSet<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for &index in merged {
            match runs.last_mut() {
                Some((_, last)) if *last + 1 == index => *last = index,
                _ => runs.push((index, index)),
            }
        }
        runs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<u32>, D::Error> {
        let runs = Vec::<(u32, u32)>::deserialize(deserializer)?;
        Ok(runs.into_iter().flat_map(|(first, last)| first..=last).collect())
    }
}

/// The sidecar directory belonging to one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    dir: PathBuf,
}

impl Sidecar {
    pub fn for_output(output: &Path) -> Self {
        let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(SIDECAR_SUFFIX);
        Self { dir: output.with_file_name(name) }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn manifest_path(&self) -> PathBuf { self.dir.join(MANIFEST_FILE) }

    pub fn part_path(&self, index: u32) -> PathBuf { self.dir.join(format!("part-{index}")) }

    /// Read the manifest.
    ///
    /// A missing or undecodable manifest yields `None`. Any other failure to
    /// read it is an error, so parts are never discarded because of a
    /// transient I/O problem.
    pub fn load(&self) -> tessera_fs::Result<Option<Manifest>> {
        let path = self.manifest_path();
        let bytes = match atomic_read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        match serde_json::from_slice(&bytes) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(error) => {
                debug!(path = %path.display(), %error, "ignoring undecodable manifest");
                Ok(None)
            }
        }
    }

    pub fn store(&self, manifest: &Manifest) -> Result<(), WriteError> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        atomic_write(self.manifest_path(), &bytes, AtomicWriteOptions::new().sync(true))?;
        Ok(())
    }

    pub fn create(&self) -> tessera_fs::Result<()> { ensure_dir(&self.dir) }

    pub fn remove(&self) -> tessera_fs::Result<()> { remove_dir_if_exists(&self.dir) }
}
