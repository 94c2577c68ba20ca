use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use tracing::warn;

use crate::data::options::FetchPhase;

/// Snapshot of a run's progress handed to a [`ProgressSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Current phase of the run.
    pub phase: FetchPhase,

    /// Bytes of the resource accounted for, resumed bytes included.
    pub bytes_downloaded: u64,

    /// Total expected bytes, if the server declared a length.
    pub total_bytes: Option<u64>,

    /// Retries issued so far across all ranges.
    pub retry_count: u32,
}

impl Progress {
    /// Completion percentage (0.0 to 100.0), if the total is known.
    ///
    /// An empty resource counts as complete.
    pub fn percentage(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_downloaded as f64 / total as f64) * 100.0
            }
        })
    }

    pub fn is_completed(&self) -> bool { self.phase == FetchPhase::Completed }
}

/// Destination for progress snapshots, usually a terminal renderer.
///
/// Rendering failures never fail the transfer: the tracker logs them and
/// carries on. Snapshots from concurrent workers may arrive out of order.
pub trait ProgressSink: Send + Sync {
    fn render(&self, progress: &Progress) -> io::Result<()>;

    /// Called once the output path is known, before any snapshot of the
    /// transfer itself.
    fn label(&self, _output: &Path) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&Progress) -> io::Result<()> + Send + Sync,
{
    fn render(&self, progress: &Progress) -> io::Result<()> { self(progress) }
}

/// Run-scoped byte counter shared by all workers.
///
/// The counter starts at the bytes credited from an earlier run, only ever
/// grows, and never exceeds the total.
pub struct ProgressTracker {
    total:    Option<u64>,
    observed: AtomicU64,
    received: AtomicU64,
    retries:  AtomicU32,
    phase:    AtomicU8,
    finished: AtomicBool,
    sink:     Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total", &self.total)
            .field("observed", &self.observed())
            .field("received", &self.received())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    pub fn new(total: Option<u64>, credited: u64, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        let credited = total.map_or(credited, |t| credited.min(t));
        Self {
            total,
            observed: AtomicU64::new(credited),
            received: AtomicU64::new(0),
            retries: AtomicU32::new(0),
            phase: AtomicU8::new(encode(FetchPhase::Connecting)),
            finished: AtomicBool::new(false),
            sink,
        }
    }

    /// Account for `n` more bytes of the resource.
    pub fn advance(&self, n: u64) {
        if n == 0 {
            return;
        }
        let total = self.total;
        let previous = self
            .observed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.saturating_add(n);
                Some(total.map_or(next, |t| next.min(t)))
            })
            .unwrap_or_else(|current| current);
        let now = total.map_or(previous.saturating_add(n), |t| previous.saturating_add(n).min(t));
        self.emit(self.phase(), now);
    }

    /// Count body bytes received from the network.
    ///
    /// Separate from [`advance`](Self::advance): a restarted unranged stream
    /// receives bytes again without the resource growing.
    pub fn record_received(&self, n: u64) { self.received.fetch_add(n, Ordering::Relaxed); }

    pub fn record_retry(&self) { self.retries.fetch_add(1, Ordering::Relaxed); }

    pub fn set_phase(&self, phase: FetchPhase) {
        self.phase.store(encode(phase), Ordering::Release);
        self.emit(phase, self.observed());
    }

    /// Emit the terminal [`FetchPhase::Completed`] snapshot. Later calls do
    /// nothing.
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_phase(FetchPhase::Completed);
    }

    pub fn observed(&self) -> u64 { self.observed.load(Ordering::Acquire) }

    pub fn received(&self) -> u64 { self.received.load(Ordering::Relaxed) }

    pub fn total(&self) -> Option<u64> { self.total }

    pub fn phase(&self) -> FetchPhase { decode(self.phase.load(Ordering::Acquire)) }

    pub fn snapshot(&self) -> Progress {
        Progress {
            phase:            self.phase(),
            bytes_downloaded: self.observed(),
            total_bytes:      self.total,
            retry_count:      self.retries.load(Ordering::Relaxed),
        }
    }

    fn emit(&self, phase: FetchPhase, bytes: u64) {
        let Some(sink) = &self.sink else {
            return;
        };
        let progress = Progress {
            phase,
            bytes_downloaded: bytes,
            total_bytes: self.total,
            retry_count: self.retries.load(Ordering::Relaxed),
        };
        if let Err(error) = sink.render(&progress) {
            warn!(%error, "progress rendering failed");
        }
    }
}

fn encode(phase: FetchPhase) -> u8 {
    match phase {
        FetchPhase::Connecting => 0,
        FetchPhase::Downloading => 1,
        FetchPhase::Merging => 2,
        FetchPhase::Completed => 3,
    }
}

fn decode(raw: u8) -> FetchPhase {
    match raw {
        0 => FetchPhase::Connecting,
        1 => FetchPhase::Downloading,
        2 => FetchPhase::Merging,
        _ => FetchPhase::Completed,
    }
}
