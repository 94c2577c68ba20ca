//! I/O for segmented downloads.
//!
//! Negotiation and fetching go through the [`HttpClient`] seam; the output
//! file and sidecar are touched only through `tessera-fs`.

mod coordinator;
mod downloader;
mod http;
mod negotiate;
mod pool;
mod resume;
mod sidecar;
mod worker;

pub use coordinator::{MergeTarget, WriteCoordinator};
pub use downloader::Downloader;
pub use self::http::{BoxStream, HttpClient, Response, ResponseHead};
pub use negotiate::negotiate;
pub use resume::{Resume, inspect, start_fresh};
pub use sidecar::{Manifest, Sidecar};

#[cfg(feature = "reqwest")]
pub use self::http::ReqwestClient;
