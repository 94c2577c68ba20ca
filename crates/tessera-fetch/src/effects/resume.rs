//! Resume detection: turn what an earlier run left on disk into a
//! [`PartialState`].

use std::collections::BTreeMap;
use std::path::Path;

use tessera_fs::existing_len;
use tracing::{debug, warn};

use crate::core::{PartialState, Policy};
use crate::data::Range;
use crate::effects::sidecar::{Manifest, Sidecar};
use crate::error::PlanningError;

/// Resume state for one run together with the manifest it continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub state:    PartialState,
    pub manifest: Manifest,
    /// No earlier state applies; the output must be truncated.
    pub fresh:    bool,
}

/// Inspect the sidecar next to `output`.
///
/// Parts are only trusted when the manifest was written for the same URL,
/// total and partition policy. Anything else is discarded and the run starts
/// fresh. A manifest that exists but cannot be read fails the run and leaves
/// the sidecar alone.
pub fn inspect(
    sidecar: &Sidecar,
    output: &Path,
    url: &str,
    total: Option<u64>,
    policy: Option<Policy>,
    ranges: &[Range],
) -> Result<Resume, PlanningError> {
    let manifest = match sidecar.load()? {
        Some(manifest) if manifest.describes(url, total, policy) => manifest,
        Some(_) => {
            warn!(sidecar = %sidecar.dir().display(), "resume state belongs to a different download, discarding");
            return start_fresh(sidecar, url, total, policy);
        }
        None => return start_fresh(sidecar, url, total, policy),
    };

    let mut parts = BTreeMap::new();
    for range in ranges {
        if let Some(len) = existing_len(sidecar.part_path(range.index))? {
            parts.insert(range.index, len);
        }
    }
    let output_len = existing_len(output)?.unwrap_or(0);

    debug!(
        parts = parts.len(),
        merged = manifest.merged.len(),
        output_len,
        "found resume state"
    );

    Ok(Resume {
        state: PartialState { parts, merged: manifest.merged.clone(), output_len },
        manifest,
        fresh: false,
    })
}

/// Drop any earlier state and prepare an empty sidecar.
pub fn start_fresh(
    sidecar: &Sidecar,
    url: &str,
    total: Option<u64>,
    policy: Option<Policy>,
) -> Result<Resume, PlanningError> {
    if sidecar.dir().exists() {
        debug!(sidecar = %sidecar.dir().display(), "clearing sidecar");
        sidecar.remove()?;
    }
    sidecar.create()?;

    Ok(Resume {
        state:    PartialState::default(),
        manifest: Manifest::new(url, total, policy),
        fresh:    true,
    })
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use tempfile::tempdir;

    const URL: &str = "http://host/file.bin";

    fn quarters() -> Option<Policy> { Some(Policy::FixedCount(NonZeroUsize::new(4).unwrap())) }

    fn ranges() -> Vec<Range> {
        vec![
            Range::new(0, 0, 24),
            Range::new(1, 25, 49),
            Range::new(2, 50, 74),
            Range::new(3, 75, 99),
        ]
    }

    #[test]
    fn test_no_sidecar_starts_fresh() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let sidecar = Sidecar::for_output(&output);

        let resume = inspect(&sidecar, &output, URL, Some(100), quarters(), &ranges()).unwrap();
        assert!(resume.fresh);
        assert_eq!(resume.state, PartialState::default());
        assert!(sidecar.dir().is_dir());
    }

    #[test]
    fn test_matching_manifest_reports_parts_and_merges() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let sidecar = Sidecar::for_output(&output);
        sidecar.create().unwrap();

        let mut manifest = Manifest::new(URL, Some(100), quarters());
        manifest.merged.insert(0);
        sidecar.store(&manifest).unwrap();
        std::fs::write(sidecar.part_path(1), [0u8; 25]).unwrap();
        std::fs::write(sidecar.part_path(2), [0u8; 7]).unwrap();
        std::fs::write(&output, [0u8; 25]).unwrap();

        let resume = inspect(&sidecar, &output, URL, Some(100), quarters(), &ranges()).unwrap();
        assert!(!resume.fresh);
        assert_eq!(resume.state.parts, BTreeMap::from([(1, 25), (2, 7)]));
        assert!(resume.state.merged.contains(&0));
        assert_eq!(resume.state.output_len, 25);
        assert_eq!(resume.manifest, manifest);
    }

    #[test]
    fn test_mismatched_manifest_discards_parts() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let sidecar = Sidecar::for_output(&output);
        sidecar.create().unwrap();
        sidecar.store(&Manifest::new("http://other/file.bin", Some(100), quarters())).unwrap();
        std::fs::write(sidecar.part_path(0), [1u8; 25]).unwrap();

        let resume = inspect(&sidecar, &output, URL, Some(100), quarters(), &ranges()).unwrap();
        assert!(resume.fresh);
        assert!(resume.state.parts.is_empty());
        assert!(!sidecar.part_path(0).exists());
        assert_eq!(resume.manifest.url, URL);
    }

    #[test]
    fn test_orphan_parts_without_manifest_are_cleared() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let sidecar = Sidecar::for_output(&output);
        sidecar.create().unwrap();
        std::fs::write(sidecar.part_path(3), [1u8; 10]).unwrap();

        let resume = inspect(&sidecar, &output, URL, Some(100), quarters(), &ranges()).unwrap();
        assert!(resume.fresh);
        assert!(!sidecar.part_path(3).exists());
    }

    #[test]
    fn test_other_policy_discards_parts() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let sidecar = Sidecar::for_output(&output);
        sidecar.create().unwrap();
        sidecar.store(&Manifest::new(URL, Some(100), Some(Policy::FixedCount(NonZeroUsize::MIN)))).unwrap();
        std::fs::write(sidecar.part_path(0), [1u8; 25]).unwrap();

        let resume = inspect(&sidecar, &output, URL, Some(100), quarters(), &ranges()).unwrap();
        assert!(resume.fresh);
        assert!(!sidecar.part_path(0).exists());
        assert_eq!(resume.manifest.policy, quarters());
    }

    #[test]
    fn test_unreadable_manifest_keeps_parts() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let sidecar = Sidecar::for_output(&output);
        std::fs::create_dir_all(sidecar.manifest_path()).unwrap();
        std::fs::write(sidecar.part_path(0), [1u8; 25]).unwrap();

        let err = inspect(&sidecar, &output, URL, Some(100), quarters(), &ranges()).unwrap_err();
        assert!(matches!(err, PlanningError::Sidecar(_)));
        assert_eq!(std::fs::read(sidecar.part_path(0)).unwrap(), [1u8; 25]);
    }
}
