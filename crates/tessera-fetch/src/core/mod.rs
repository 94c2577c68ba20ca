//! Pure transformations for segmented downloads.
//!
//! Nothing in here touches the network or the filesystem: range arithmetic,
//! header interpretation, naming and retry timing.

mod headers;
mod naming;
mod plan;
mod retry;

pub use headers::{
    accepts_byte_ranges, content_length, content_range_first, content_range_total, disposition_filename,
    parse_disposition, range_header,
};
pub use naming::{FALLBACK_FILENAME, filename_from_url, resolve_output, sanitize_filename};
pub use plan::{Completed, PartialState, Plan, Policy, apply_resume, partition};
pub use retry::{is_retryable_status, retry_delay};
