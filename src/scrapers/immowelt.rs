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
use url::Url;

const ORIGIN: &str = "https://www.immowelt.de";

static RULES: SourceRules = SourceRules {
    source: Source::Immowelt,
    origin: ORIGIN,
    containers: &[
        ContainerRule::card("[data-estate-id]"),
        ContainerRule::card(".EstateItem-1c115"),
        ContainerRule::card(".estate-item"),
        ContainerRule::card("article[data-estate-id]"),
        ContainerRule::card(".estate"),
        ContainerRule::card(r#"[class*="EstateItem"]"#),
        ContainerRule::card(r#"[class*="estate"]"#),
        ContainerRule::card("div[data-estate-id]"),
        ContainerRule::link(r#"a[href*="/immobilie/"]"#),
    ],
    skip_class: None,
    title: &[
        "h2 a",
        "h3 a",
        "h2",
        "h3",
        r#"[data-qa="estate-title"]"#,
        ".estate-title a",
        ".estate-title",
        r#"a[href*="/immobilie/"]"#,
        r#"[class*="title"]"#,
    ],
    title_min_len: 6,
    price: &[r#"[class*="price"]"#, r#"[class*="Price"]"#, "[data-price]"],
    details: &[".key-facts", r#"[data-qa="estate-facts"]"#],
    link: &[r#"a[href*="/immobilie/"]"#, r#"a[href*="/expose/"]"#, "h2 a", "h3 a", ".estate-title a"],
    image: &[
        "img[data-src]",
        "img[data-lazy]",
        "img[data-original]",
        "picture img",
        r#"[class*="image"] img"#,
        r#"[class*="Image"] img"#,
        "img[src]",
    ],
    sibling_images: true,
    address: &[r#"[data-qa="estate-location"]"#, r#"[class*="location"]"#],
    description: &[],
    date: &[],
    detail_links: &["/immobilie/", "/expose/"],
};

/// Equipment codes understood by the search URL, paired with the filter flag
const EQUIPMENT: [(u8, fn(&ListingFilters) -> bool); 5] = [
    (1, |f| f.amenities.balcony),
    (2, |f| f.amenities.garden),
    (3, |f| f.amenities.kitchen),
    (4, |f| f.amenities.lift),
    (5, |f| f.amenities.parking),
];

/// Immowelt scraper over static search result HTML
pub struct ImmoweltScraper {
    fetcher: Arc<dyn PageFetcher>,
    limit: usize,
}

impl ImmoweltScraper {
    pub fn new(options: FetchOptions, limit: usize) -> Result<Self> {
        let fetcher = HttpFetcher::new(options)
            .context("Failed to create HTTP client")?
            .with_referer("https://www.immowelt.de/");
        Ok(Self::with_fetcher(Arc::new(fetcher), limit))
    }

    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>, limit: usize) -> Self {
        Self { fetcher, limit }
    }

    /// Search URL with price, area, rooms and equipment narrowed at the source
    pub fn search_url(filters: &ListingFilters) -> Result<Url> {
        let slug = normalize_city(&filters.city);
        let mut url = Url::parse(&format!("{ORIGIN}/liste/{slug}/wohnungen/mieten"))?;

        {
            let mut query = url.query_pairs_mut();
            let numeric = [
                ("pmi", filters.min_price),
                ("pma", filters.max_price),
                ("ami", filters.min_area),
                ("ama", filters.max_area),
                ("r", filters.rooms),
            ];
            for (key, value) in numeric {
                if let Some(value) = value.filter(|v| *v > 0) {
                    query.append_pair(key, &value.to_string());
                }
            }
            for (code, wanted) in EQUIPMENT {
                if wanted(filters) {
                    query.append_pair("eq", &code.to_string());
                }
            }
            query.append_pair("sort", "createdDate");
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
impl ListingSource for ImmoweltScraper {
    async fn scrape(&self, filters: &ListingFilters) -> Result<Vec<Listing>> {
        let url = Self::search_url(filters)?;
        info!("[Immowelt] Fetching: {}", url);

        match self.fetcher.fetch(url.as_str()).await {
            Ok(html) => Ok(self.parse(&html, filters)),
            Err(err) => {
                warn!("[Immowelt] Fetch error: {}", err);
                Ok(Vec::new())
            }
        }
    }

    fn source(&self) -> Source {
        Source::Immowelt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Amenities;
    use crate::scrapers::http::FetchError;

    const PAGE: &str = r#"
        <html><body>
          <div data-estate-id="101" class="EstateItem">
            <h2><a href="/expose/101">Helle 2-Zimmer-Wohnung mit Einbauküche</a></h2>
            <div class="key-facts">2 Zimmer · 61 m² · 3. OG</div>
            <div class="price-tag">1.090 €</div>
            <picture><img data-src="https://mms.immowelt.de/101.jpg"></picture>
          </div>
          <div data-estate-id="102" class="EstateItem">
            <h2><a href="https://www.immowelt.de/expose/102">Dachgeschoss mit Terrasse</a></h2>
            <div class="key-facts">3,5 Zimmer · 95 m²</div>
            <div class="price-tag">1.650 €</div>
          </div>
        </body></html>
    "#;

    struct StaticPage(Result<&'static str, u16>);

    #[async_trait]
    impl PageFetcher for StaticPage {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            match self.0 {
                Ok(html) => Ok(html.to_string()),
                Err(status) => Err(FetchError::Status { url: url.to_string(), status }),
            }
        }
    }

    #[test]
    fn search_url_carries_filters() {
        let filters = ListingFilters {
            city: "Munich".to_string(),
            min_price: Some(500),
            max_price: Some(1500),
            rooms: Some(2),
            amenities: Amenities { balcony: true, lift: true, ..Default::default() },
            ..Default::default()
        };

        let url = ImmoweltScraper::search_url(&filters).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.immowelt.de/liste/muenchen/wohnungen/mieten?pmi=500&pma=1500&r=2&eq=1&eq=4&sort=createdDate"
        );
    }

    #[tokio::test]
    async fn scrapes_estate_cards() {
        let scraper = ImmoweltScraper::with_fetcher(Arc::new(StaticPage(Ok(PAGE))), 50);
        let listings = scraper.scrape(&ListingFilters::default()).await.unwrap();

        assert_eq!(listings.len(), 2);
        let first = &listings[0];
        assert_eq!(first.source, Source::Immowelt);
        assert_eq!(first.title, "Helle 2-Zimmer-Wohnung mit Einbauküche");
        assert_eq!(first.price, 1090);
        assert_eq!(first.rooms, 2);
        assert_eq!(first.area, 61);
        assert_eq!(first.floor.as_deref(), Some("3"));
        assert_eq!(first.url, "https://www.immowelt.de/expose/101");
        assert_eq!(first.image.as_deref(), Some("https://mms.immowelt.de/101.jpg"));
        assert!(first.amenities.kitchen);

        let second = &listings[1];
        assert_eq!(second.rooms, 4);
        assert_eq!(second.floor.as_deref(), Some("Dachgeschoss"));
        assert!(second.amenities.balcony);
    }

    #[tokio::test]
    async fn fetch_failure_yields_empty_list() {
        let scraper = ImmoweltScraper::with_fetcher(Arc::new(StaticPage(Err(503))), 50);
        let listings = scraper.scrape(&ListingFilters::default()).await.unwrap();
        assert!(listings.is_empty());
    }

    #[tokio::test]
    async fn price_comes_from_the_euro_amount_not_the_key_facts() {
        const CARD: &str = r#"
            <div data-estate-id="301">
              <h2><a href="/expose/301">Sanierte Wohnung nahe Spree</a></h2>
              <div class="key-facts">2 Zimmer · 61 m²</div>
              <div class="hardfacts"><strong>1.090 €</strong></div>
            </div>
        "#;
        let scraper = ImmoweltScraper::with_fetcher(Arc::new(StaticPage(Ok(CARD))), 50);
        let listings = scraper.scrape(&ListingFilters::default()).await.unwrap();

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price, 1090);
        assert_eq!(listings[0].rooms, 2);
        assert_eq!(listings[0].area, 61);
    }

    #[tokio::test]
    async fn image_is_taken_from_next_to_the_card() {
        const PAGE: &str = r#"
            <div class="result-list">
              <div class="estate-gallery"><img src="https://mms.immowelt.de/401.jpg"></div>
              <div data-estate-id="401">
                <h2><a href="/expose/401">Ruhige Wohnung im Hinterhaus</a></h2>
                <div class="price-tag">850 €</div>
              </div>
            </div>
        "#;
        let scraper = ImmoweltScraper::with_fetcher(Arc::new(StaticPage(Ok(PAGE))), 50);
        let listings = scraper.scrape(&ListingFilters::default()).await.unwrap();

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].image.as_deref(), Some("https://mms.immowelt.de/401.jpg"));
    }
}
