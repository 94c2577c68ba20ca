//! A single range fetch: request, stream into the companion file, retry.

use std::io;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use http::StatusCode;
use tessera_fs::existing_len;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{content_range_first, retry_delay};
use crate::data::{FetchOptions, FetchResult, ProgressTracker, Range};
use crate::effects::http::{BoxStream, HttpClient, Response};
use crate::effects::sidecar::Sidecar;
use crate::error::{Error, FetchError};

/// Work for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// A `Range: bytes=` request for one planned range.
    Range(Range),
    /// One unranged stream of the whole resource into range 0.
    Whole { expected: Option<u64> },
}

impl Job {
    pub fn index(&self) -> u32 {
        match self {
            Job::Range(range) => range.index,
            Job::Whole { .. } => 0,
        }
    }

    /// Bytes of this job already credited to the tracker by planning.
    fn credited(&self) -> u64 {
        match self {
            Job::Range(range) => range.fetched(),
            Job::Whole { .. } => 0,
        }
    }
}

enum Interrupt {
    Cancelled,
    Failed(FetchError),
}

impl From<FetchError> for Interrupt {
    fn from(error: FetchError) -> Self { Interrupt::Failed(error) }
}

/// Everything a worker needs, shared by all workers of a run.
pub struct Worker<C> {
    client:  Arc<C>,
    url:     Arc<str>,
    options: FetchOptions,
    sidecar: Sidecar,
    tracker: Arc<ProgressTracker>,
    cancel:  CancellationToken,
}

impl<C: HttpClient> Worker<C> {
    pub fn new(
        client: Arc<C>,
        url: &str,
        options: FetchOptions,
        sidecar: Sidecar,
        tracker: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self { client, url: Arc::from(url), options, sidecar, tracker, cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken { &self.cancel }

    /// Fetch `job`, retrying transient failures with exponential backoff.
    ///
    /// Every retry continues from what the companion file already holds, so
    /// no byte is transferred or counted twice for ranged jobs.
    pub async fn run(&self, job: Job) -> Result<FetchResult, Error> {
        let index = job.index();
        let mut reported = job.credited();
        let mut retries = 0u32;

        loop {
            let attempt = match &job {
                Job::Range(range) => self.fetch_range(range, &mut reported).await,
                Job::Whole { expected } => self.fetch_whole(*expected, &mut reported).await,
            };

            let error = match attempt {
                Ok(result) => {
                    debug!(range = index, len = result.len, retries, "range fetched");
                    return Ok(result);
                }
                Err(Interrupt::Cancelled) => return Err(Error::Cancelled),
                Err(Interrupt::Failed(error)) => error,
            };

            if !error.is_retryable() {
                return Err(error.into());
            }
            if retries >= self.options.max_retries {
                if retries == 0 {
                    return Err(error.into());
                }
                return Err(FetchError::RetriesExhausted {
                    range:    index,
                    attempts: retries + 1,
                    last:     Box::new(error),
                }
                .into());
            }

            let delay = retry_delay(retries, self.options.retry_backoff);
            retries += 1;
            self.tracker.record_retry();
            warn!(range = index, attempt = retries, ?delay, %error, "retrying range");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn fetch_range(&self, range: &Range, reported: &mut u64) -> Result<FetchResult, Interrupt> {
        let index = range.index;
        let part = self.sidecar.part_path(index);
        let len = range.len();

        let have = existing_len(&part)
            .map_err(|e| FetchError::Io { range: index, source: io::Error::other(e) })?
            .unwrap_or(0);
        if have > len {
            return Err(FetchError::OverlongBody { range: index, expected: len }.into());
        }

        let start = range.base + have;
        if start <= range.end {
            if have > 0 {
                debug!(range = index, offset = start, "continuing range");
            }
            let response = self.request(index, Some(start..=range.end)).await?;
            if response.head.status != StatusCode::PARTIAL_CONTENT {
                return Err(FetchError::UnexpectedStatus { range: index, status: response.head.status.as_u16() }.into());
            }
            match content_range_first(&response.head.headers) {
                Ok(Some(served)) if served != start => {
                    return Err(FetchError::MisplacedBody { range: index, requested: start, served }.into());
                }
                Ok(_) => {}
                Err(e) => return Err(FetchError::Transport { range: index, reason: e.to_string() }.into()),
            }

            let mut file = open_part(&part, false).await.map_err(|e| FetchError::Io { range: index, source: e })?;
            let mut position = have;
            self.drain(&mut file, response.body, index, Some(len), &mut position, reported).await?;

            if position < len {
                return Err(FetchError::ShortBody {
                    range:    index,
                    expected: len - have,
                    received: position - have,
                }
                .into());
            }
        }

        Ok(FetchResult { index, base: range.base, len, part })
    }

    async fn fetch_whole(&self, expected: Option<u64>, reported: &mut u64) -> Result<FetchResult, Interrupt> {
        let part = self.sidecar.part_path(0);

        let response = self.request(0, None).await?;
        if !response.head.status.is_success() {
            return Err(FetchError::UnexpectedStatus { range: 0, status: response.head.status.as_u16() }.into());
        }

        let mut file = open_part(&part, true).await.map_err(|e| FetchError::Io { range: 0, source: e })?;
        let mut position = 0;
        self.drain(&mut file, response.body, 0, expected, &mut position, reported).await?;

        if let Some(expected) = expected {
            if position < expected {
                return Err(FetchError::ShortBody { range: 0, expected, received: position }.into());
            }
        }

        Ok(FetchResult { index: 0, base: 0, len: position, part })
    }

    async fn request(
        &self,
        index: u32,
        range: Option<RangeInclusive<u64>>,
    ) -> Result<Response<C::Error>, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            response = self.client.get(&self.url, range, &self.options.headers) => {
                response.map_err(|e| FetchError::Transport { range: index, reason: e.to_string() }.into())
            }
        }
    }

    /// Stream `body` into `file`, whatever happens flushing what was written
    /// so the next attempt sees the true companion length.
    async fn drain(
        &self,
        file: &mut File,
        body: BoxStream<'static, Result<bytes::Bytes, C::Error>>,
        index: u32,
        limit: Option<u64>,
        position: &mut u64,
        reported: &mut u64,
    ) -> Result<(), Interrupt> {
        let streamed = self.stream(file, body, index, limit, position, reported).await;
        let flushed = async {
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        streamed?;
        flushed.map_err(|e| FetchError::Io { range: index, source: e })?;
        Ok(())
    }

    async fn stream(
        &self,
        file: &mut File,
        mut body: BoxStream<'static, Result<bytes::Bytes, C::Error>>,
        index: u32,
        limit: Option<u64>,
        position: &mut u64,
        reported: &mut u64,
    ) -> Result<(), Interrupt> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                return Ok(());
            };
            let chunk = chunk.map_err(|e| FetchError::Transport { range: index, reason: e.to_string() })?;
            let n = chunk.len() as u64;

            if let Some(limit) = limit {
                if *position + n > limit {
                    return Err(FetchError::OverlongBody { range: index, expected: limit }.into());
                }
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Io { range: index, source: e })?;
            *position += n;

            self.tracker.record_received(n);
            if *position > *reported {
                self.tracker.advance(*position - *reported);
                *reported = *position;
            }
        }
    }
}

async fn open_part(path: &Path, truncate: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path).await
}
