#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tessera_fetch::{HttpClient, Progress, ProgressSink, Response, ResponseHead};

#[derive(Debug, thiserror::Error)]
#[error("server unavailable")]
pub struct Unavailable;

/// Misbehaviour applied to the next GET.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Close the body after this many bytes.
    Truncate(usize),
    /// Answer with this status and an empty body.
    Status(u16),
    /// Fail at the transport level.
    Refuse,
}

/// In-memory resource behind the `HttpClient` seam.
pub struct MemoryServer {
    data:        Vec<u8>,
    ranges:      bool,
    length:      bool,
    disposition: Option<String>,
    chunk:       usize,
    faults:      Mutex<VecDeque<Fault>>,
    gets:        Mutex<Vec<Option<RangeInclusive<u64>>>>,
    served:      Arc<AtomicU64>,
}

impl MemoryServer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ranges: true,
            length: true,
            disposition: None,
            chunk: 8 * 1024,
            faults: Mutex::new(VecDeque::new()),
            gets: Mutex::new(Vec::new()),
            served: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    pub fn without_length(mut self) -> Self {
        self.length = false;
        self
    }

    pub fn disposition(mut self, value: &str) -> Self {
        self.disposition = Some(value.to_string());
        self
    }

    pub fn chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn fault(self, fault: Fault) -> Self {
        self.faults.lock().unwrap().push_back(fault);
        self
    }

    /// Ranges requested so far, sorted by start.
    pub fn gets(&self) -> Vec<Option<RangeInclusive<u64>>> {
        let mut gets = self.gets.lock().unwrap().clone();
        gets.sort_by_key(|r| r.as_ref().map(|r| *r.start()));
        gets
    }

    /// Body bytes actually streamed to the client.
    pub fn served(&self) -> u64 { self.served.load(Ordering::SeqCst) }

    pub fn reset_counters(&self) {
        self.gets.lock().unwrap().clear();
        self.served.store(0, Ordering::SeqCst);
    }

    fn body(&self, slice: &[u8]) -> tessera_fetch::BoxStream<'static, Result<Bytes, Unavailable>> {
        let served = Arc::clone(&self.served);
        let chunks: Vec<Bytes> = slice.chunks(self.chunk.max(1)).map(Bytes::copy_from_slice).collect();
        Box::pin(futures_util::stream::iter(chunks).map(move |chunk| {
            served.fetch_add(chunk.len() as u64, Ordering::SeqCst);
            Ok(chunk)
        }))
    }
}

impl HttpClient for MemoryServer {
    type Error = Unavailable;

    async fn head(&self, _url: &str, _headers: &[(String, String)]) -> Result<ResponseHead, Unavailable> {
        let mut headers = HeaderMap::new();
        if self.length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.data.len() as u64));
        }
        if self.ranges {
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }
        if let Some(disposition) = &self.disposition {
            headers.insert(CONTENT_DISPOSITION, HeaderValue::from_str(disposition).unwrap());
        }
        Ok(ResponseHead { status: StatusCode::OK, headers })
    }

    async fn get(
        &self,
        _url: &str,
        range: Option<RangeInclusive<u64>>,
        _headers: &[(String, String)],
    ) -> Result<Response<Unavailable>, Unavailable> {
        self.gets.lock().unwrap().push(range.clone());
        let fault = self.faults.lock().unwrap().pop_front();

        match fault {
            Some(Fault::Refuse) => return Err(Unavailable),
            Some(Fault::Status(status)) => {
                let head = ResponseHead { status: StatusCode::from_u16(status).unwrap(), headers: HeaderMap::new() };
                return Ok(Response { head, body: self.body(&[]) });
            }
            _ => {}
        }

        let mut headers = HeaderMap::new();
        let (status, mut slice) = match range.filter(|_| self.ranges) {
            Some(r) => {
                let end = (*r.end() as usize).min(self.data.len() - 1);
                let start = *r.start() as usize;
                let value = format!("bytes {start}-{end}/{}", self.data.len());
                headers.insert(CONTENT_RANGE, HeaderValue::from_str(&value).unwrap());
                (StatusCode::PARTIAL_CONTENT, &self.data[start..=end])
            }
            None => (StatusCode::OK, &self.data[..]),
        };
        if let Some(Fault::Truncate(n)) = fault {
            slice = &slice[..n.min(slice.len())];
        }

        Ok(Response { head: ResponseHead { status, headers }, body: self.body(slice) })
    }
}

/// Deterministic, non-repeating test payload.
pub fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// Records every progress snapshot and the output label.
#[derive(Default)]
pub struct Recorder {
    pub seen:  Mutex<Vec<Progress>>,
    pub label: Mutex<Option<PathBuf>>,
}

impl Recorder {
    pub fn bytes(&self) -> Vec<u64> { self.seen.lock().unwrap().iter().map(|p| p.bytes_downloaded).collect() }
}

impl ProgressSink for Recorder {
    fn render(&self, progress: &Progress) -> std::io::Result<()> {
        self.seen.lock().unwrap().push(progress.clone());
        Ok(())
    }

    fn label(&self, output: &Path) { *self.label.lock().unwrap() = Some(output.to_path_buf()); }
}
