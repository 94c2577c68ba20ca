use std::num::NonZeroUsize;

/// What the server revealed about a resource before any body was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceMetadata {
    /// Total length in bytes, if the server declared one.
    pub total:           Option<u64>,
    /// File name suggested through `Content-Disposition`.
    pub filename:        Option<String>,
    /// The server honours `Range: bytes=` requests.
    pub range_supported: bool,
}

impl ResourceMetadata {
    /// Whether the resource can be split into independent ranges.
    pub fn can_segment(&self) -> bool { self.range_supported && self.total.is_some() }

    /// Concurrency actually usable for this resource.
    ///
    /// Without range support or a known length only one unranged stream is
    /// possible, whatever the caller asked for.
    pub fn effective_concurrency(&self, requested: NonZeroUsize) -> NonZeroUsize {
        if self.can_segment() { requested } else { NonZeroUsize::MIN }
    }
}
