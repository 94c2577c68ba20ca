//! Immutable data types for segmented downloads.
//!
//! Run configuration, negotiated metadata, range descriptors and progress
//! reporting. Everything here is plain data apart from
//! [`ProgressTracker`], the one piece of state workers share.

pub mod metadata;
pub mod options;
pub mod progress;
pub mod range;
pub mod spec;

pub use metadata::ResourceMetadata;
pub use options::{FetchOptions, FetchPhase};
pub use progress::{Progress, ProgressSink, ProgressTracker};
pub use range::{FetchResult, Range};
pub use spec::{DownloadSpec, Outcome};
