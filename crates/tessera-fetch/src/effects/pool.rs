//! Bounded dispatch of fetch jobs.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::error;

use crate::data::FetchResult;
use crate::effects::http::HttpClient;
use crate::effects::worker::{Job, Worker};
use crate::error::{Error, WriteError};

/// Run `jobs` with at most `concurrency` requests in flight, handing every
/// fetched range to `results`.
///
/// Jobs are admitted in order; a job holds its permit from before its
/// request until its result is handed off. The first failure cancels the
/// worker's token so the remaining jobs stop, leaving their companion files
/// for a later run.
pub async fn dispatch<C: HttpClient>(
    worker: Arc<Worker<C>>,
    jobs: Vec<Job>,
    concurrency: NonZeroUsize,
    results: mpsc::Sender<FetchResult>,
) -> Result<(), Error> {
    let gate = Arc::new(Semaphore::new(concurrency.get()));
    let cancel = worker.cancellation().clone();
    let mut tasks = JoinSet::new();
    let mut failure = None;

    for job in jobs {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&gate).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let worker = Arc::clone(&worker);
        let results = results.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let result = worker.run(job).await?;
            results.send(result).await.map_err(|_| WriteError::CoordinatorGone)?;
            Ok::<_, Error>(())
        });

        while let Some(joined) = tasks.try_join_next() {
            settle(joined, &mut failure, &cancel);
        }
    }
    drop(results);

    while let Some(joined) = tasks.join_next().await {
        settle(joined, &mut failure, &cancel);
    }

    match failure {
        Some(error) => Err(error),
        None if cancel.is_cancelled() => Err(Error::Cancelled),
        None => Ok(()),
    }
}

/// Keep the first real failure; cancellations triggered by it are noise.
fn settle(
    joined: Result<Result<(), Error>, tokio::task::JoinError>,
    failure: &mut Option<Error>,
    cancel: &tokio_util::sync::CancellationToken,
) {
    let error = match joined {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(join) => Error::Task(join),
    };

    if !error.is_cancelled() {
        error!(%error, "range failed, stopping download");
        cancel.cancel();
    }

    let replace = match failure {
        None => true,
        Some(current) => current.is_cancelled() && !error.is_cancelled(),
    };
    if replace {
        *failure = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::RangeInclusive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::data::{FetchOptions, ProgressTracker, Range};
    use crate::effects::http::{Response, ResponseHead};
    use crate::effects::sidecar::Sidecar;
    use crate::error::FetchError;

    #[derive(Debug, thiserror::Error)]
    #[error("unused")]
    struct Never;

    /// Serves 206 with 10 zero bytes, tracking the peak number of requests
    /// in flight. Requests for `fail_at` get a 404.
    struct Gauge {
        active:  AtomicUsize,
        peak:    AtomicUsize,
        calls:   AtomicUsize,
        fail_at: Option<u64>,
    }

    impl Gauge {
        fn new(fail_at: Option<u64>) -> Self {
            Self { active: AtomicUsize::new(0), peak: AtomicUsize::new(0), calls: AtomicUsize::new(0), fail_at }
        }
    }

    impl HttpClient for Gauge {
        type Error = Never;

        async fn head(&self, _url: &str, _headers: &[(String, String)]) -> Result<ResponseHead, Never> {
            unreachable!("pool never sends HEAD")
        }

        async fn get(
            &self,
            _url: &str,
            range: Option<RangeInclusive<u64>>,
            _headers: &[(String, String)],
        ) -> Result<Response<Never>, Never> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let start = range.map(|r| *r.start()).unwrap_or(0);
            let status = if Some(start) == self.fail_at { StatusCode::NOT_FOUND } else { StatusCode::PARTIAL_CONTENT };
            let head = ResponseHead { status, headers: HeaderMap::new() };
            let body = futures_util::stream::iter([Ok(Bytes::from_static(&[0u8; 10]))]);
            Ok(Response { head, body: Box::pin(body) })
        }
    }

    fn setup(client: Gauge, dir: &std::path::Path) -> Arc<Worker<Gauge>> {
        let sidecar = Sidecar::for_output(&dir.join("out"));
        sidecar.create().unwrap();
        let tracker = Arc::new(ProgressTracker::new(Some(200), 0, None));
        Arc::new(Worker::new(
            Arc::new(client),
            "http://host/out",
            FetchOptions::default().max_retries(0),
            sidecar,
            tracker,
            CancellationToken::new(),
        ))
    }

    fn jobs(n: u32) -> Vec<Job> {
        (0..n).map(|i| Job::Range(Range::new(i, u64::from(i) * 10, u64::from(i) * 10 + 9))).collect()
    }

    #[tokio::test]
    async fn test_every_job_delivers_a_result() {
        let dir = tempdir().unwrap();
        let worker = setup(Gauge::new(None), dir.path());
        let (tx, mut rx) = mpsc::channel(32);

        dispatch(Arc::clone(&worker), jobs(12), NonZeroUsize::new(3).unwrap(), tx).await.unwrap();

        let mut seen = Vec::new();
        while let Some(result) = rx.recv().await {
            seen.push(result.index);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_peak_in_flight_never_exceeds_gate() {
        let dir = tempdir().unwrap();
        let client = Arc::new(Gauge::new(None));
        let sidecar = Sidecar::for_output(&dir.path().join("out"));
        sidecar.create().unwrap();
        let worker = Arc::new(Worker::new(
            Arc::clone(&client),
            "http://host/out",
            FetchOptions::default(),
            sidecar,
            Arc::new(ProgressTracker::new(Some(200), 0, None)),
            CancellationToken::new(),
        ));
        let (tx, mut rx) = mpsc::channel(32);

        dispatch(worker, jobs(16), NonZeroUsize::new(4).unwrap(), tx).await.unwrap();
        while rx.recv().await.is_some() {}

        assert_eq!(client.calls.load(Ordering::SeqCst), 16);
        assert!(client.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_first_failure_wins_and_cancels() {
        let dir = tempdir().unwrap();
        let worker = setup(Gauge::new(Some(0)), dir.path());
        let (tx, _rx) = mpsc::channel(32);

        let err = dispatch(Arc::clone(&worker), jobs(8), NonZeroUsize::new(1).unwrap(), tx).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::UnexpectedStatus { range: 0, status: 404 })));
        assert!(worker.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let dir = tempdir().unwrap();
        let worker = setup(Gauge::new(None), dir.path());
        worker.cancellation().cancel();
        let (tx, _rx) = mpsc::channel(32);

        let err = dispatch(worker, jobs(4), NonZeroUsize::new(2).unwrap(), tx).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_results_channel() {
        let dir = tempdir().unwrap();
        let worker = setup(Gauge::new(None), dir.path());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = dispatch(worker, jobs(2), NonZeroUsize::new(1).unwrap(), tx).await.unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::CoordinatorGone)));
    }
}
