use std::path::PathBuf;

/// A contiguous slice of the resource owned by exactly one worker.
///
/// `base..=end` is the slice the range owns; `start` is the first byte not
/// yet fetched, so `start - base` bytes were recovered from an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Range index (0-based, ordered by offset)
    pub index: u32,
    /// First byte owned by the range
    pub base:  u64,
    /// First byte still to fetch
    pub start: u64,
    /// Last byte owned by the range (inclusive)
    pub end:   u64,
}

impl Range {
    pub fn new(index: u32, base: u64, end: u64) -> Self { Self { index, base, start: base, end } }

    /// Bytes owned by the range.
    pub fn len(&self) -> u64 { self.end + 1 - self.base }

    /// Bytes already present before fetching.
    pub fn fetched(&self) -> u64 { self.start - self.base }

    /// Bytes that still have to cross the network.
    pub fn remaining(&self) -> u64 { (self.end + 1).saturating_sub(self.start) }

    pub fn is_complete(&self) -> bool { self.start > self.end }

    pub fn is_resumed(&self) -> bool { self.start > self.base }
}

/// A fetched range, ready to be merged into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub index: u32,
    /// Output offset the payload belongs at
    pub base:  u64,
    /// Payload length
    pub len:   u64,
    /// Companion file holding the payload
    pub part:  PathBuf,
}
