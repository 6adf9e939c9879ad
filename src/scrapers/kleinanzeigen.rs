use crate::city::normalize_city;
use crate::models::{Listing, ListingFilters, Source};
use crate::scrapers::extract::{extract_listings, ContainerRule, ExtractContext, SourceRules};
use crate::scrapers::http::{FetchOptions, HttpFetcher};
use crate::scrapers::traits::{ListingSource, PageFetcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

const ORIGIN: &str = "https://www.kleinanzeigen.de";

/// Cities whose search lives outside the generic `/s-wohnungen/{slug}/c203` path
const SPECIAL_PATHS: &[(&str, &str)] = &[("trier", "/s-wohnung-mieten/trier/c203l5432")];

static RULES: SourceRules = SourceRules {
    source: Source::Kleinanzeigen,
    origin: ORIGIN,
    containers: &[
        ContainerRule::card("[data-adid]"),
        ContainerRule::card(".ad-listitem"),
        ContainerRule::card("article[data-adid]"),
        ContainerRule::card(".aditem"),
        ContainerRule::card(r#"[id^="ad-"]"#),
    ],
    skip_class: None,
    title: &[
        ".aditem-main h2 a",
        "h2 a",
        "h3 a",
        ".ellipsis a",
        r#"a[href*="/s-anzeige/"]"#,
        ".aditem-main--top--left a",
        r#"[class*="title"] a"#,
    ],
    title_min_len: 1,
    price: &[
        ".aditem-main .aditem-price",
        ".aditem-price",
        ".aditem-main--middle--price-shipping--price",
        ".aditem-details strong",
        r#"[class*="price"]"#,
    ],
    details: &[".aditem-main--bottom", ".text-module-end", ".simpletag"],
    link: &[r#"a[href*="/s-anzeige/"]"#, r#"a[href*="/anzeige/"]"#, ".aditem-main a", "h2 a", "h3 a"],
    image: &["img[data-src]", "img[data-lazy]", "img"],
    sibling_images: false,
    address: &[".aditem-main--top--left"],
    description: &[".aditem-main--middle--description"],
    date: &[".aditem-main--top--right"],
    detail_links: &["/s-anzeige/"],
};

/// Kleinanzeigen scraper over static search result HTML
pub struct KleinanzeigenScraper {
    fetcher: Arc<dyn PageFetcher>,
    limit: usize,
}

impl KleinanzeigenScraper {
    pub fn new(options: FetchOptions, limit: usize) -> Result<Self> {
        let fetcher = HttpFetcher::new(options)
            .context("Failed to create HTTP client")?
            .with_referer("https://www.kleinanzeigen.de/");
        Ok(Self::with_fetcher(Arc::new(fetcher), limit))
    }

    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>, limit: usize) -> Self {
        Self { fetcher, limit }
    }

    pub fn search_url(filters: &ListingFilters) -> String {
        let slug = normalize_city(&filters.city);
        match SPECIAL_PATHS.iter().find(|(city, _)| *city == slug) {
            Some((_, path)) => format!("{ORIGIN}{path}"),
            None => format!("{ORIGIN}/s-wohnungen/{slug}/c203"),
        }
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
impl ListingSource for KleinanzeigenScraper {
    async fn scrape(&self, filters: &ListingFilters) -> Result<Vec<Listing>> {
        let url = Self::search_url(filters);
        info!("[Kleinanzeigen] Fetching: {}", url);

        match self.fetcher.fetch(&url).await {
            Ok(html) => Ok(self.parse(&html, filters)),
            Err(err) => {
                warn!("[Kleinanzeigen] Fetch error: {}", err);
                Ok(Vec::new())
            }
        }
    }

    fn source(&self) -> Source {
        Source::Kleinanzeigen
    }
}
