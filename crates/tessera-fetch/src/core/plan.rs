//! Range partitioning and resume accounting.

use std::collections::{BTreeMap, BTreeSet};
use std::num::{NonZeroU64, NonZeroUsize};

use serde::{Deserialize, Serialize};

use crate::data::Range;
use crate::error::PlanningError;

/// How a resource of known length is cut into ranges.
///
/// Together with the total this fixes the whole layout, so it is all the
/// resume manifest needs to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Ranges of exactly this many bytes; the last one is shorter.
    FixedBlock(NonZeroU64),
    /// This many near-equal ranges; the remainder goes to the last one.
    FixedCount(NonZeroUsize),
}

/// Split `total` bytes into contiguous, non-overlapping ranges.
///
/// Ranges come back in increasing offset order, their union is exactly
/// `[0, total)` and none is empty. A zero-length resource has no ranges.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use tessera_fetch::core::{partition, Policy};
///
/// let ranges = partition(1_000_000, Policy::FixedCount(NonZeroUsize::new(4).unwrap())).unwrap();
/// let bounds: Vec<_> = ranges.iter().map(|r| (r.base, r.end)).collect();
/// assert_eq!(bounds, [(0, 249_999), (250_000, 499_999), (500_000, 749_999), (750_000, 999_999)]);
/// ```
pub fn partition(total: u64, policy: Policy) -> Result<Vec<Range>, PlanningError> {
    if total == 0 {
        return Ok(Vec::new());
    }

    let (count, size) = match policy {
        Policy::FixedBlock(block) => {
            let block = block.get();
            (total.div_ceil(block), block)
        }
        Policy::FixedCount(n) => {
            let count = (n.get() as u64).min(total);
            (count, total / count)
        }
    };

    if count > u64::from(u32::MAX) + 1 {
        return Err(PlanningError::TooManyRanges { total, block_size: size });
    }

    let last = count - 1;
    let ranges = (0..count)
        .map(|i| {
            let base = i * size;
            let end = if i == last { total - 1 } else { base + size - 1 };
            Range::new(i as u32, base, end)
        })
        .collect();

    Ok(ranges)
}

/// What an earlier run left on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialState {
    /// Companion-file size per range index.
    pub parts:      BTreeMap<u32, u64>,
    /// Ranges the manifest records as merged into the output.
    pub merged:     BTreeSet<u32>,
    /// Current length of the output file.
    pub output_len: u64,
}

impl PartialState {
    pub fn is_empty(&self) -> bool { self.parts.values().all(|&n| n == 0) && self.merged.is_empty() }
}

/// A range that needs no network traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completed {
    /// Its companion file is whole and still has to be merged.
    Fetched(Range),
    /// Already merged into the output by an earlier run.
    Merged(Range),
}

impl Completed {
    pub fn range(&self) -> &Range {
        match self {
            Completed::Fetched(range) | Completed::Merged(range) => range,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Ranges still to fetch, in offset order, with `start` advanced past
    /// any bytes already on disk.
    pub pending:   Vec<Range>,
    pub completed: Vec<Completed>,
    /// Bytes already accounted for before any request is made.
    pub credited:  u64,
}

impl Plan {
    /// Ranges that reuse bytes from an earlier run.
    pub fn resumed(&self) -> usize {
        self.completed.len() + self.pending.iter().filter(|r| r.is_resumed()).count()
    }
}

/// Fold on-disk state into a fresh partition.
///
/// With `partial` unset, companion files shorter than their range are
/// ignored and the range is fetched from its base again; servers without
/// range support cannot continue a stream mid-way.
pub fn apply_resume(
    ranges: Vec<Range>,
    state: &PartialState,
    partial: bool,
) -> Result<Plan, PlanningError> {
    let mut plan = Plan::default();

    for mut range in ranges {
        let len = range.len();

        if state.merged.contains(&range.index) && state.output_len > range.end {
            plan.credited += len;
            plan.completed.push(Completed::Merged(range));
            continue;
        }

        let have = state.parts.get(&range.index).copied().unwrap_or(0);
        if have > len {
            return Err(PlanningError::OversizedPart { index: range.index, expected: len, actual: have });
        }
        if have < len && !partial {
            plan.pending.push(range);
            continue;
        }

        range.start = range.base + have;
        plan.credited += have;
        if range.is_complete() {
            plan.completed.push(Completed::Fetched(range));
        } else {
            plan.pending.push(range);
        }
    }

    Ok(plan)
}
