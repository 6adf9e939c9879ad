mod aggregator;
mod city;
mod config;
mod models;
mod scrapers;
mod store;
mod web;

use aggregator::{Aggregator, QueryCache};
use anyhow::Context;
use config::Config;
use scrapers::{ImmoweltScraper, KleinanzeigenScraper, ListingSource, WgGesuchtScraper};
use std::sync::Arc;
use store::SqliteStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use web::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("🏠 Flat Scout");

    let limit = config.max_results_per_source;
    let mut sources: Vec<Arc<dyn ListingSource>> = vec![
        Arc::new(ImmoweltScraper::new(config.fetch_options(), limit)?),
        Arc::new(KleinanzeigenScraper::new(config.fetch_options(), limit)?),
    ];
    if config.browser_enabled {
        sources.push(Arc::new(WgGesuchtScraper::new(config.browser_timeout, limit)));
    } else {
        info!("Browser disabled, skipping WG-Gesucht");
    }
    let names: Vec<String> = sources.iter().map(|s| s.source().to_string()).collect();
    info!("Sources: {}", names.join(", "));

    let store = if config.database_path == ":memory:" {
        SqliteStore::open_in_memory()
    } else {
        SqliteStore::open(&config.database_path)
    }
    .context("Failed to open listing store")?;

    let cache = QueryCache::new(config.cache_ttl, config.cache_limit());
    let aggregator = Aggregator::new(sources, Arc::new(store), cache);

    let state = AppState {
        aggregator: Arc::new(aggregator),
    };
    web::start_http_server(state, &config.bind_address).await
}
