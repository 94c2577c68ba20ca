use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::{Completed, Policy, apply_resume, partition, resolve_output};
use crate::data::{
    DownloadSpec, FetchOptions, FetchPhase, FetchResult, Outcome, ProgressSink, ProgressTracker, Range,
    ResourceMetadata,
};
use crate::effects::coordinator::{MergeTarget, WriteCoordinator};
use crate::effects::http::HttpClient;
use crate::effects::negotiate::negotiate;
use crate::effects::pool::dispatch;
use crate::effects::resume::{Resume, inspect, start_fresh};
use crate::effects::sidecar::Sidecar;
use crate::effects::worker::{Job, Worker};
use crate::error::{Error, PlanningError, Result, WriteError};

/// Segmented, resumable download of one resource.
///
/// # Examples
///
/// ```no_run
/// use std::num::NonZeroUsize;
/// use tessera_fetch::{DownloadSpec, Downloader, ReqwestClient};
///
/// let spec = DownloadSpec::new("https://example.com/image.iso", ".")
///     .concurrency(NonZeroUsize::new(8).unwrap());
/// let outcome = Downloader::new(ReqwestClient::new(), spec).run_blocking()?;
/// println!("{} bytes -> {}", outcome.bytes_written, outcome.path.display());
/// # Ok::<(), tessera_fetch::Error>(())
/// ```
pub struct Downloader<C> {
    client:  Arc<C>,
    spec:    DownloadSpec,
    options: FetchOptions,
    sink:    Option<Arc<dyn ProgressSink>>,
    cancel:  CancellationToken,
}

/// Work derived from planning, ready to hand to the pool.
struct Schedule {
    jobs:     Vec<Job>,
    ready:    Vec<FetchResult>,
    layout:   Vec<Range>,
    expected: BTreeSet<u32>,
    credited: u64,
    resumed:  usize,
}

impl<C: HttpClient> Downloader<C> {
    pub fn new(client: C, spec: DownloadSpec) -> Self { Self::with_shared_client(Arc::new(client), spec) }

    /// Use a client shared with other downloads.
    pub fn with_shared_client(client: Arc<C>, spec: DownloadSpec) -> Self {
        Self {
            client,
            spec,
            options: FetchOptions::default(),
            sink: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Stop the run when `token` is cancelled. In-flight ranges stop where
    /// they are and their companion files stay for the next run.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn spec(&self) -> &DownloadSpec { &self.spec }

    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Run to completion on a fresh multi-threaded runtime.
    ///
    /// Must not be called from within an async context.
    pub fn run_blocking(&self) -> Result<Outcome> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        runtime.block_on(self.run())
    }

    pub async fn run(&self) -> Result<Outcome> {
        let url = self.spec.url.as_str();

        let metadata = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            metadata = negotiate(&*self.client, url, &self.options) => metadata?,
        };
        info!(
            url,
            total = ?metadata.total,
            range_supported = metadata.range_supported,
            filename = ?metadata.filename,
            "negotiated"
        );

        let output = self.output_path(&metadata).await?;
        if let Some(sink) = &self.sink {
            sink.label(&output);
        }
        let sidecar = Sidecar::for_output(&output);
        let concurrency = metadata.effective_concurrency(self.spec.concurrency);
        if concurrency < self.spec.concurrency {
            info!("server cannot serve ranges, using a single stream");
        }

        let (resume, schedule) = self.plan(&metadata, &output, &sidecar)?;
        let tracker = Arc::new(ProgressTracker::new(metadata.total, schedule.credited, self.sink.clone()));

        let coordinator = WriteCoordinator::spawn(
            MergeTarget {
                output: output.clone(),
                sidecar: sidecar.clone(),
                manifest: resume.manifest,
                layout: schedule.layout,
                expected: schedule.expected,
                total: metadata.total,
                truncate: resume.fresh,
            },
            concurrency.get().saturating_mul(2),
        )?;

        let results = coordinator.sender();
        for result in schedule.ready {
            if results.send(result).await.is_err() {
                drop(results);
                return Err(coordinator.finish().await.err().unwrap_or(WriteError::CoordinatorGone).into());
            }
        }

        tracker.set_phase(FetchPhase::Downloading);
        let worker = Arc::new(Worker::new(
            Arc::clone(&self.client),
            url,
            self.options.clone(),
            sidecar,
            Arc::clone(&tracker),
            self.cancel.child_token(),
        ));
        let fetched = dispatch(worker, schedule.jobs, concurrency, results).await;
        if fetched.is_ok() {
            tracker.set_phase(FetchPhase::Merging);
        }
        let merged = coordinator.finish().await;

        let bytes_written = match (fetched, merged) {
            (Ok(()), Ok(len)) => len,
            (Ok(()), Err(write)) | (Err(Error::Write(WriteError::CoordinatorGone)), Err(write)) => {
                error!(%write, "merging failed");
                return Err(write.into());
            }
            (Err(error), _) => {
                if error.is_cancelled() {
                    info!(path = %output.display(), "download cancelled, partial state kept");
                } else {
                    error!(%error, "download failed");
                }
                return Err(error);
            }
        };

        tracker.finish();
        let outcome = Outcome {
            path: output,
            bytes_written,
            bytes_fetched: tracker.received(),
            ranges_resumed: schedule.resumed,
        };
        info!(
            path = %outcome.path.display(),
            bytes_written = outcome.bytes_written,
            bytes_fetched = outcome.bytes_fetched,
            ranges_resumed = outcome.ranges_resumed,
            "download complete"
        );
        Ok(outcome)
    }

    async fn output_path(&self, metadata: &ResourceMetadata) -> Result<PathBuf> {
        let output = &self.spec.output;
        let is_dir = if output.as_os_str().is_empty() {
            true
        } else {
            match tokio::fs::metadata(output).await {
                Ok(meta) => meta.is_dir(),
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(PlanningError::Output(e).into()),
            }
        };
        Ok(resolve_output(output, is_dir, metadata.filename.as_deref(), &self.spec.url))
    }

    fn policy(&self) -> Policy {
        match self.spec.block_size {
            Some(block) => Policy::FixedBlock(block),
            None => Policy::FixedCount(self.spec.concurrency),
        }
    }

    fn plan(
        &self,
        metadata: &ResourceMetadata,
        output: &std::path::Path,
        sidecar: &Sidecar,
    ) -> std::result::Result<(Resume, Schedule), PlanningError> {
        let url = self.spec.url.as_str();

        let Some(total) = metadata.total else {
            let resume = start_fresh(sidecar, url, None, None)?;
            let schedule = Schedule {
                jobs:     vec![Job::Whole { expected: None }],
                ready:    Vec::new(),
                layout:   Vec::new(),
                expected: BTreeSet::from([0]),
                credited: 0,
                resumed:  0,
            };
            return Ok((resume, schedule));
        };

        let policy = if metadata.range_supported { self.policy() } else { Policy::FixedCount(NonZeroUsize::MIN) };
        let ranges = partition(total, policy)?;
        let resume = inspect(sidecar, output, url, Some(total), Some(policy), &ranges)?;
        let layout = ranges.clone();
        let plan = apply_resume(ranges, &resume.state, metadata.range_supported)?;

        let planned = plan.completed.len() + plan.pending.len();
        let mut schedule = Schedule {
            jobs:     Vec::with_capacity(plan.pending.len()),
            ready:    Vec::new(),
            layout,
            expected: BTreeSet::new(),
            credited: plan.credited,
            resumed:  plan.resumed(),
        };

        for completed in &plan.completed {
            match completed {
                Completed::Merged(range) => {
                    debug!(range = range.index, "already merged");
                }
                Completed::Fetched(range) => {
                    info!(range = range.index, "already fetched, merging");
                    schedule.expected.insert(range.index);
                    schedule.ready.push(FetchResult {
                        index: range.index,
                        base:  range.base,
                        len:   range.len(),
                        part:  sidecar.part_path(range.index),
                    });
                }
            }
        }

        for range in plan.pending {
            if range.is_resumed() {
                info!(range = range.index, offset = range.start, end = range.end, "resuming range");
            } else {
                debug!(range = range.index, start = range.start, end = range.end, "scheduled range");
            }
            schedule.expected.insert(range.index);
            schedule.jobs.push(if metadata.range_supported {
                Job::Range(range)
            } else {
                Job::Whole { expected: Some(total) }
            });
        }

        info!(
            ranges = planned,
            pending = schedule.jobs.len(),
            credited = schedule.credited,
            "planned"
        );
        Ok((resume, schedule))
    }
}
