//! Segmented, resumable HTTP downloading.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and types
//! - [`core`] - Pure transformations
//! - [`effects`] - I/O operations with trait abstraction
//!
//! # Key Features
//!
//! - **Concurrent Ranges**: The resource is split into byte ranges fetched by a
//!   bounded pool of workers
//! - **Resumable**: Every range streams into its own companion file next to
//!   the output; an interrupted run continues where each range stopped and a
//!   finished one is not fetched again
//! - **Single Writer**: One coordinator places finished ranges into the
//!   output by offset, in whatever order they complete
//! - **Graceful Fallback**: Servers without range support or a declared
//!   length get one plain stream

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use crate::core::{Policy, partition, retry_delay};
pub use data::{
    DownloadSpec, FetchOptions, FetchPhase, FetchResult, Outcome, Progress, ProgressSink,
    ProgressTracker, Range, ResourceMetadata,
};
pub use effects::{BoxStream, Downloader, HttpClient, Response, ResponseHead, negotiate};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestClient;

pub use error::{Error, FetchError, NegotiationError, PlanningError, Result, WriteError};
