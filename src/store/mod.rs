pub mod sqlite;

use crate::models::Listing;
use async_trait::async_trait;
use thiserror::Error;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

/// Persisted copy of every scraped listing, read when live scraping fails
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert or replace by url, keeping the original creation time.
    /// Returns how many rows were written.
    async fn upsert_many(&self, listings: &[Listing]) -> Result<usize, StoreError>;

    /// Listings whose city contains `city`, ignoring case, newest first
    async fn find_by_city_like(&self, city: &str) -> Result<Vec<Listing>, StoreError>;
}
