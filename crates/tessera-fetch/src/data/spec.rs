use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};

/// Immutable configuration of one download run.
///
/// # Examples
///
/// ```
/// use std::num::{NonZeroU64, NonZeroUsize};
/// use tessera_fetch::DownloadSpec;
///
/// let spec = DownloadSpec::new("https://example.com/file.iso", ".")
///     .concurrency(NonZeroUsize::new(8).unwrap())
///     .block_size(NonZeroU64::new(16 * 1024 * 1024));
/// assert_eq!(spec.concurrency.get(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSpec {
    pub url: String,

    /// Literal output file, or an existing directory the resolved file name
    /// is joined onto.
    pub output: PathBuf,

    /// Upper bound on simultaneously active range requests.
    ///
    /// Default: 1
    pub concurrency: NonZeroUsize,

    /// Split the resource into ranges of this many bytes instead of one
    /// range per worker.
    ///
    /// Default: None
    pub block_size: Option<NonZeroU64>,
}

impl DownloadSpec {
    pub fn new(url: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            url:         url.into(),
            output:      output.as_ref().to_path_buf(),
            concurrency: NonZeroUsize::MIN,
            block_size:  None,
        }
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn block_size(mut self, block_size: Option<NonZeroU64>) -> Self {
        self.block_size = block_size;
        self
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Final output path, after directory resolution.
    pub path:           PathBuf,
    /// Length of the finished output file.
    pub bytes_written:  u64,
    /// Body bytes received over the network during this run.
    pub bytes_fetched:  u64,
    /// Ranges that reused bytes from an earlier interrupted run.
    pub ranges_resumed: usize,
}
