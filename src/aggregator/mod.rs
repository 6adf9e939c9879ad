//! Search request pipeline: every source scraped concurrently, results
//! persisted, then filtered, deduplicated and sorted. Answers are cached per
//! raw query string; when the live pipeline fails, stored listings are served
//! instead.

pub mod cache;
pub mod filter;

use crate::models::{Listing, ListingFilters};
use crate::scrapers::ListingSource;
use crate::store::{ListingStore, StoreError};
use anyhow::{anyhow, bail};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use cache::{Clock, QueryCache, SystemClock};
pub use filter::refine;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("live search failed ({live}) and stored listings are unavailable: {store}")]
    Unavailable {
        live: String,
        #[source]
        store: StoreError,
    },
}

pub struct Aggregator {
    sources: Vec<Arc<dyn ListingSource>>,
    store: Arc<dyn ListingStore>,
    cache: QueryCache,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn ListingSource>>, store: Arc<dyn ListingStore>, cache: QueryCache) -> Self {
        Self { sources, store, cache }
    }

    /// Answer a raw `a=1&b=2` query string.
    ///
    /// A cached answer for the identical string is returned as is. Only a
    /// failure of both the live pipeline and the store is an error.
    pub async fn search(&self, raw_query: &str) -> Result<Vec<Listing>, SearchError> {
        if let Some(cached) = self.cache.get(raw_query) {
            debug!("Cache hit for query {:?} ({} listings)", raw_query, cached.len());
            return Ok(cached);
        }

        let filters = ListingFilters::from_query(raw_query);
        info!("Searching {} (query {:?})", filters.city, raw_query);

        let live = tokio::spawn(scrape_all(
            self.sources.clone(),
            Arc::clone(&self.store),
            filters.clone(),
        ));
        let outcome = match live.await {
            Ok(outcome) => outcome,
            Err(err) => Err(anyhow!("aggregation task failed: {err}")),
        };

        match outcome {
            Ok(scraped) => {
                let listings = refine(scraped, &filters);
                info!("Returning {} listings for {}", listings.len(), filters.city);
                self.cache.put(raw_query, listings.clone());
                Ok(listings)
            }
            Err(err) => {
                error!("Live search failed: {:#}", err);
                self.fallback(&filters).await.map_err(|store| SearchError::Unavailable {
                    live: err.to_string(),
                    store,
                })
            }
        }
    }

    async fn fallback(&self, filters: &ListingFilters) -> Result<Vec<Listing>, StoreError> {
        let stored = self.store.find_by_city_like(&filters.city).await?;
        let listings = refine(stored, filters);
        info!("Serving {} stored listings for {}", listings.len(), filters.city);
        Ok(listings)
    }
}

/// Run every selected source at once and concatenate what succeeded, in
/// source order. Fails only when every source failed.
async fn scrape_all(
    sources: Vec<Arc<dyn ListingSource>>,
    store: Arc<dyn ListingStore>,
    filters: ListingFilters,
) -> anyhow::Result<Vec<Listing>> {
    let filters = Arc::new(filters);

    let handles: Vec<_> = sources
        .into_iter()
        .filter(|source| filters.allows_source(source.source()))
        .map(|source| {
            let filters = Arc::clone(&filters);
            let name = source.source();
            (name, tokio::spawn(async move { source.scrape(&filters).await }))
        })
        .collect();

    let total = handles.len();
    let mut failures = 0;
    let mut listings = Vec::new();

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(found)) => {
                info!("[{}] {} listings", name, found.len());
                listings.extend(found);
            }
            Ok(Err(err)) => {
                warn!("[{}] Source failed: {:#}", name, err);
                failures += 1;
            }
            Err(err) => {
                warn!("[{}] Source task failed: {}", name, err);
                failures += 1;
            }
        }
    }

    if total > 0 && failures == total {
        bail!("all {} sources failed", total);
    }

    match store.upsert_many(&listings).await {
        Ok(written) => debug!("Persisted {} listings", written),
        Err(err) => warn!("Failed to persist listings: {}", err),
    }

    Ok(listings)
}
