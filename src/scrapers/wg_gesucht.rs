use crate::city::{normalize_city, wg_city_id};
use crate::models::{Listing, ListingFilters, Source};
use crate::scrapers::browser::BrowserFetcher;
use crate::scrapers::extract::{extract_listings, ContainerRule, ExtractContext, SourceRules};
use crate::scrapers::traits::{ListingSource, PageFetcher};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const ORIGIN: &str = "https://www.wg-gesucht.de";

static RULES: SourceRules = SourceRules {
    source: Source::WgGesucht,
    origin: ORIGIN,
    containers: &[ContainerRule::card(".offer_list_item"), ContainerRule::card(".wgg_card")],
    skip_class: Some("display-none"),
    title: &["h3 a", ".truncate_title a", ".list-details-link", "h3", ".truncate_title"],
    title_min_len: 1,
    price: &[".detailansicht b", ".col-xs-3 b", "[data-price]", ".middle b"],
    details: &[".detail_size", ".col-xs-3"],
    link: &["a.detailansicht", "a.list-details-link", "h3 a"],
    image: &[".card_image img", "img"],
    sibling_images: false,
    address: &[".col-xs-11 span", ".card_body .col-xs-11"],
    description: &[],
    date: &[".flex_space_between span", ".online_duration"],
    detail_links: &["/wohnungen-in-", "/wg-zimmer-in-", "/1-zimmer-wohnungen-in-"],
};

/// WG-Gesucht scraper. The site only renders its result list with
/// JavaScript, so pages go through a headless browser by default.
pub struct WgGesuchtScraper {
    fetcher: Arc<dyn PageFetcher>,
    limit: usize,
}

impl WgGesuchtScraper {
    pub fn new(browser_timeout: Duration, limit: usize) -> Self {
        Self::with_fetcher(Arc::new(BrowserFetcher::new(browser_timeout)), limit)
    }

    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>, limit: usize) -> Self {
        Self { fetcher, limit }
    }

    /// `wg-zimmer-in-{slug}.{id}.0.1.0.html`, dropping the id segment when the city is unknown
    pub fn search_url(filters: &ListingFilters) -> Result<Url> {
        let slug = normalize_city(&filters.city);
        let city_id = wg_city_id(&filters.city);

        let page = match &city_id {
            Some(id) => format!("{ORIGIN}/wg-zimmer-in-{slug}.{id}.0.1.0.html"),
            None => format!("{ORIGIN}/wg-zimmer-in-{slug}.0.1.0.html"),
        };
        let mut url = Url::parse(&page)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("category", "0");
            query.append_pair("rent_type", "0");
            query.append_pair("sort_order", "0");
            query.append_pair("noDeact", "1");
            if let Some(id) = &city_id {
                query.append_pair("city_id", id);
            }
            let numeric = [
                ("rent_price_min", filters.min_price),
                ("rent_price_max", filters.max_price),
                ("room_nr", filters.rooms),
                ("flat_size_min", filters.min_area),
                ("flat_size_max", filters.max_area),
            ];
            for (key, value) in numeric {
                if let Some(value) = value.filter(|v| *v > 0) {
                    query.append_pair(key, &value.to_string());
                }
            }
        }

        Ok(url)
    }

    pub fn parse(&self, html: &str, filters: &ListingFilters) -> Vec<Listing> {
        let ctx = ExtractContext {
            city: &filters.city,
            now: Utc::now(),
            limit: self.limit,
        };
        extract_listings(html, &RULES, &ctx)
    }
}

#[async_trait]
impl ListingSource for WgGesuchtScraper {
    async fn scrape(&self, filters: &ListingFilters) -> Result<Vec<Listing>> {
        let url = Self::search_url(filters)?;
        info!("[WG-Gesucht] Fetching via browser: {}", url);

        match self.fetcher.fetch(url.as_str()).await {
            Ok(html) => Ok(self.parse(&html, filters)),
            Err(err) => {
                warn!("[WG-Gesucht] Fetch error: {}", err);
                Ok(Vec::new())
            }
        }
    }

    fn source(&self) -> Source {
        Source::WgGesucht
    }
}
