use std::sync::Arc;
use std::time::Duration;

/// Phases of a download run.
///
/// Runs move through these phases in order:
/// Connecting → Downloading → Merging → Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPhase {
    /// Probing the resource and inspecting resume state.
    #[default]
    Connecting,

    /// Range bodies are streaming into their companion files.
    ///
    /// Completed ranges are merged into the output as they arrive, so
    /// merging already happens during this phase.
    Downloading,

    /// Every range is fetched; the output file is being finalized.
    Merging,

    /// Terminal state of a successful run.
    Completed,
}

impl std::fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchPhase::Connecting => write!(f, "Connecting"),
            FetchPhase::Downloading => write!(f, "Downloading"),
            FetchPhase::Merging => write!(f, "Merging"),
            FetchPhase::Completed => write!(f, "Completed"),
        }
    }
}

/// Request policy shared by every range of a run.
///
/// # Examples
///
/// ```
/// use tessera_fetch::FetchOptions;
/// use std::time::Duration;
///
/// let options = FetchOptions::default()
///     .max_retries(5)
///     .retry_backoff(Duration::from_millis(200))
///     .header("Authorization", "Bearer token");
/// ```
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum number of retry attempts per range for transient failures.
    ///
    /// - Retries are triggered for transport errors, truncated bodies and
    ///   5xx/408/429 responses
    /// - Other 4xx responses and oversized bodies fail the range immediately
    /// - Total attempts per range = 1 (initial) + max_retries
    ///
    /// Default: 3
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    ///
    /// The delay before retry N (0-indexed) is `retry_backoff * 2^N`.
    ///
    /// Default: 100ms
    pub retry_backoff: Duration,

    /// Extra HTTP headers sent with every request, the HEAD request included.
    ///
    /// Default: empty
    pub headers: Arc<[(String, String)]>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries:   3,
            retry_backoff: Duration::from_millis(100),
            headers:       Arc::new([]),
        }
    }
}

impl FetchOptions {
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Add a single custom HTTP header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers: Vec<_> = self.headers.iter().cloned().collect();
        headers.push((key.into(), value.into()));
        self.headers = Arc::from(headers);
        self
    }

    /// Replace all custom headers at once.
    #[must_use]
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = Arc::from(headers);
        self
    }
}
