use crate::models::{Listing, ListingFilters, Source};
use crate::scrapers::http::FetchError;
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for all listing sources.
/// The aggregator runs every registered source concurrently.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Scrape listings matching the filters from the source
    async fn scrape(&self, filters: &ListingFilters) -> Result<Vec<Listing>>;

    /// Which site this scraper reads
    fn source(&self) -> Source;
}

/// Anything that can turn a URL into page HTML: a plain GET or a rendered browser tab
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
