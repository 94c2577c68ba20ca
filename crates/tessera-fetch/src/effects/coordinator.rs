//! The single writer of the output file.
//!
//! Fetched ranges arrive over a channel in completion order. Each is copied
//! into the output at its own offset, recorded as merged in the manifest and
//! its companion file removed, so an interrupted run never loses merged
//! work. The manifest stays behind once the output is complete.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tessera_fs::{PositionedFile, remove_file_if_exists};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::data::{FetchResult, Range};
use crate::effects::sidecar::{Manifest, Sidecar};
use crate::error::WriteError;

/// Where and what the coordinator merges.
#[derive(Debug, Clone)]
pub struct MergeTarget {
    pub output:   PathBuf,
    pub sidecar:  Sidecar,
    pub manifest: Manifest,
    /// Planned ranges in index order; empty when the length is unknown.
    pub layout:   Vec<Range>,
    /// Ranges that must be delivered before the output is complete.
    pub expected: BTreeSet<u32>,
    /// Final length; `None` for a resource of unknown length.
    pub total:    Option<u64>,
    /// Drop existing output content first.
    pub truncate: bool,
}

impl MergeTarget {
    /// Planned `(base, len)` for `index`, when the layout is known.
    fn slot(&self, index: u32) -> Option<(u64, u64)> {
        self.layout.get(index as usize).map(|range| (range.base, range.len()))
    }
}

pub struct WriteCoordinator {
    sender: mpsc::Sender<FetchResult>,
    handle: JoinHandle<Result<u64, WriteError>>,
}

impl WriteCoordinator {
    /// Persist the manifest, open the output and start merging.
    pub fn spawn(target: MergeTarget, capacity: usize) -> Result<Self, WriteError> {
        target.sidecar.store(&target.manifest)?;
        let file = PositionedFile::open(&target.output, target.truncate)?;

        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::task::spawn_blocking(move || merge_all(target, file, receiver));
        Ok(Self { sender, handle })
    }

    pub fn sender(&self) -> mpsc::Sender<FetchResult> { self.sender.clone() }

    /// Wait until every sender is gone and the output is finalized.
    ///
    /// Returns the final output length. Fails with
    /// [`WriteError::MissingRanges`] if any planned range never arrived.
    /// Either way the manifest is kept; on success it lists every range as
    /// merged and no companion files remain.
    pub async fn finish(self) -> Result<u64, WriteError> {
        drop(self.sender);
        self.handle.await.map_err(|_| WriteError::CoordinatorGone)?
    }
}

fn merge_all(
    mut target: MergeTarget,
    file: PositionedFile,
    mut receiver: mpsc::Receiver<FetchResult>,
) -> Result<u64, WriteError> {
    let mut merged = BTreeSet::new();
    let mut end = 0u64;

    while let Some(result) = receiver.blocking_recv() {
        merge(&mut target, &file, &result, &mut merged)?;
        end = end.max(result.base + result.len);
    }

    let missing: Vec<u32> = target.expected.difference(&merged).copied().collect();
    if !missing.is_empty() {
        return Err(WriteError::MissingRanges { missing });
    }

    let len = target.total.unwrap_or(end);
    file.set_len(len)?;
    file.sync_all()?;
    debug!(path = %target.output.display(), len, "output finalized");
    Ok(len)
}

fn merge(
    target: &mut MergeTarget,
    file: &PositionedFile,
    result: &FetchResult,
    merged: &mut BTreeSet<u32>,
) -> Result<(), WriteError> {
    let index = result.index;
    if !target.expected.contains(&index) {
        return Err(WriteError::UnknownRange { index });
    }
    if merged.contains(&index) {
        return Err(WriteError::DuplicateRange { index });
    }
    if let Some((base, len)) = target.slot(index) {
        if result.base != base || result.len != len {
            return Err(WriteError::LengthMismatch { index, expected: len, actual: result.len });
        }
    }

    file.copy_from(&result.part, result.base, result.len).map_err(|e| match e {
        tessera_fs::Error::LengthMismatch { expected, actual, .. } => {
            WriteError::LengthMismatch { index, expected, actual }
        }
        other => WriteError::Io(other),
    })?;
    file.sync_all()?;

    merged.insert(index);
    target.manifest.merged.insert(index);
    target.sidecar.store(&target.manifest)?;
    remove_file_if_exists(&result.part)?;

    debug!(range = index, offset = result.base, len = result.len, "range merged");
    Ok(())
}
