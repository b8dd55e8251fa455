use crate::error::ScrapeError;
use crate::models::{PartialProperty, Source};

/// Common trait for all listing normalizers.
/// Each scrape source turns its raw HTML into the same partial record, so
/// enrichment, geocoding and fingerprinting never see source-specific markup.
pub trait Normalizer: Send + Sync {
    /// Turn one listing page into a partial record.
    fn normalize(&self, html: &str, url: &str) -> Result<PartialProperty, ScrapeError>;

    /// Get the source this normalizer handles
    fn source(&self) -> Source;
}
