//! Error types for tessera-fetch.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    #[error("download cancelled")]
    Cancelled,

    #[error("fetch task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool { matches!(self, Error::Cancelled) }
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("cannot reach {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{url} answered the capability check with status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed {header} header: {value:?}")]
    Malformed { header: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("companion file for range {index} holds {actual} bytes, more than the range length {expected}")]
    OversizedPart { index: u32, expected: u64, actual: u64 },

    #[error("{total} bytes in blocks of {block_size} needs more ranges than supported")]
    TooManyRanges { total: u64, block_size: u64 },

    #[error("cannot resolve output path: {0}")]
    Output(#[source] io::Error),

    #[error("sidecar state unusable: {0}")]
    Sidecar(#[from] tessera_fs::Error),
}

/// A single range's failure. Every variant names the range it belongs to.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("range {range}: transport error: {reason}")]
    Transport { range: u32, reason: String },

    #[error("range {range}: unexpected status {status}")]
    UnexpectedStatus { range: u32, status: u16 },

    #[error("range {range}: body ended after {received} of {expected} bytes")]
    ShortBody { range: u32, expected: u64, received: u64 },

    #[error("range {range}: body exceeded the expected {expected} bytes")]
    OverlongBody { range: u32, expected: u64 },

    #[error("range {range}: asked for bytes from {requested}, server sent them from {served}")]
    MisplacedBody { range: u32, requested: u64, served: u64 },

    #[error("range {range}: companion file error: {source}")]
    Io { range: u32, source: io::Error },

    #[error("range {range}: giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        range:    u32,
        attempts: u32,
        #[source]
        last:     Box<FetchError>,
    },
}

impl FetchError {
    pub fn range(&self) -> u32 {
        match self {
            FetchError::Transport { range, .. }
            | FetchError::UnexpectedStatus { range, .. }
            | FetchError::ShortBody { range, .. }
            | FetchError::OverlongBody { range, .. }
            | FetchError::MisplacedBody { range, .. }
            | FetchError::Io { range, .. }
            | FetchError::RetriesExhausted { range, .. } => *range,
        }
    }

    /// Whether another attempt at the same range could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::ShortBody { .. } => true,
            FetchError::UnexpectedStatus { status, .. } => crate::core::is_retryable_status(*status),
            FetchError::OverlongBody { .. }
            | FetchError::MisplacedBody { .. }
            | FetchError::Io { .. }
            | FetchError::RetriesExhausted { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Io(#[from] tessera_fs::Error),

    #[error("range {index} delivered twice")]
    DuplicateRange { index: u32 },

    #[error("range {index} was not planned")]
    UnknownRange { index: u32 },

    #[error("range {index} payload holds {actual} bytes, expected {expected}")]
    LengthMismatch { index: u32, expected: u64, actual: u64 },

    #[error("ranges never delivered: {missing:?}")]
    MissingRanges { missing: Vec<u32> },

    #[error("failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("write coordinator stopped unexpectedly")]
    CoordinatorGone,
}

pub type Result<T> = std::result::Result<T, Error>;
