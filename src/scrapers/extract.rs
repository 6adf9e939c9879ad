//! Rule-driven card extraction shared by every source.
//!
//! A source is described by a [`SourceRules`] table of ordered selector
//! lists. Cards are located with the first container rule that matches
//! anything; each field then takes the first selector that yields a value and
//! falls back to the text-mining rules in [`patterns`]. When no card yields a
//! listing, detail-page links are collected directly and their enclosing
//! markup is mined instead.

use crate::models::{Listing, Source};
use crate::scrapers::patterns;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

const IMAGE_ATTRS: [&str; 4] = ["data-src", "data-lazy", "data-original", "src"];
const PLACEHOLDER_MARKERS: [&str; 3] = ["placeholder", "logo", "icon"];
const DEFAULT_TITLE: &str = "Wohnung";

/// One way of locating listing cards
pub struct ContainerRule {
    pub selector: &'static str,
    /// The match is a link inside the card rather than the card itself
    pub use_parent: bool,
}

impl ContainerRule {
    pub const fn card(selector: &'static str) -> Self {
        Self { selector, use_parent: false }
    }

    pub const fn link(selector: &'static str) -> Self {
        Self { selector, use_parent: true }
    }
}

/// Selector cascades for one source. Every list is tried in order.
pub struct SourceRules {
    pub source: Source,
    /// Scheme and host relative links are resolved against
    pub origin: &'static str,
    pub containers: &'static [ContainerRule],
    /// Cards carrying this class are ads or hidden entries
    pub skip_class: Option<&'static str>,
    pub title: &'static [&'static str],
    /// Shorter selector matches are ignored as titles
    pub title_min_len: usize,
    pub price: &'static [&'static str],
    /// Where room count and area live; all matches are read together
    pub details: &'static [&'static str],
    pub link: &'static [&'static str],
    pub image: &'static [&'static str],
    /// Look for the image next to the card when it has none inside
    pub sibling_images: bool,
    pub address: &'static [&'static str],
    pub description: &'static [&'static str],
    pub date: &'static [&'static str],
    /// Substrings identifying detail-page hrefs
    pub detail_links: &'static [&'static str],
}

/// Per-request values stamped onto every extracted listing
pub struct ExtractContext<'a> {
    pub city: &'a str,
    pub now: DateTime<Utc>,
    pub limit: usize,
}

#[derive(Debug)]
enum SkipReason {
    Hidden,
    NoTitleOrPrice,
    NoUrl,
}

/// Extract up to `ctx.limit` listings from a search result page
pub fn extract_listings(html: &str, rules: &SourceRules, ctx: &ExtractContext<'_>) -> Vec<Listing> {
    let document = Html::parse_document(html);
    let source = rules.source;

    let mut listings = Vec::new();
    let mut found_cards = false;

    for container in rules.containers {
        let Some(selector) = compile(container.selector) else {
            continue;
        };

        let mut cards: Vec<ElementRef> = document.select(&selector).collect();
        if cards.is_empty() {
            continue;
        }
        if container.use_parent {
            cards = unique_parents(cards);
        }

        info!("[{}] Found {} cards with selector: {}", source, cards.len(), container.selector);
        found_cards = true;

        for (idx, card) in cards.iter().enumerate() {
            match extract_card(*card, rules, ctx) {
                Ok(listing) => listings.push(listing),
                Err(reason) => debug!("[{}] Skipped card {}: {:?}", source, idx, reason),
            }
        }

        if !listings.is_empty() {
            break;
        }
    }

    if listings.is_empty() {
        if found_cards {
            warn!("[{}] Cards found but none yielded a listing, trying detail links", source);
        } else {
            info!("[{}] No cards matched (HTML length {}), trying detail links", source, html.len());
        }
        listings = extract_from_links(&document, rules, ctx);
    }

    listings = dedup_within_page(listings);
    listings.truncate(ctx.limit);
    info!("[{}] Extracted {} listings", source, listings.len());
    listings
}

fn extract_card(card: ElementRef<'_>, rules: &SourceRules, ctx: &ExtractContext<'_>) -> Result<Listing, SkipReason> {
    if let Some(class) = rules.skip_class {
        if card.value().classes().any(|c| c == class) {
            return Err(SkipReason::Hidden);
        }
    }

    let all_text = element_text(card);

    let title = first_text(card, rules.title, rules.title_min_len)
        .or_else(|| link_text_title(card))
        .unwrap_or_default();

    // Bare digits are only trusted once no "€" amount is found anywhere
    let price_texts: Vec<String> = rules.price.iter().filter_map(|css| first_match_text(card, css)).collect();
    let price = price_texts
        .iter()
        .find_map(|text| patterns::parse_price(text))
        .or_else(|| patterns::parse_price(&all_text))
        .or_else(|| {
            price_texts
                .iter()
                .find_map(|text| patterns::digits_only(text).filter(|p| *p > 0))
        })
        .unwrap_or(0);

    if title.is_empty() && price == 0 {
        return Err(SkipReason::NoTitleOrPrice);
    }

    let url = card_link(card, rules)
        .and_then(|href| absolutize(rules.origin, &href))
        .ok_or(SkipReason::NoUrl)?;

    let details = all_matches_text(card, rules.details);
    let details = if details.is_empty() { all_text.clone() } else { details };

    let image = card_image(card, rules).or_else(|| {
        rules
            .sibling_images
            .then(|| sibling_image(card, rules.origin))
            .flatten()
    });

    let date = first_text(card, rules.date, 1)
        .and_then(|text| patterns::parse_listing_date(&text, ctx.now))
        .unwrap_or(ctx.now);

    let mut listing = Listing::new(rules.source, or_default_title(title), ctx.city, url);
    listing.price = price;
    listing.rooms = patterns::parse_rooms(&details).or_else(|| patterns::parse_rooms(&all_text)).unwrap_or(0);
    listing.area = patterns::parse_area(&details).or_else(|| patterns::parse_area(&all_text)).unwrap_or(0);
    listing.amenities = patterns::amenities(&all_text);
    listing.date = date;
    listing.image = image;
    listing.address = first_text(card, rules.address, 1);
    listing.description = first_text(card, rules.description, 1);
    listing.floor = patterns::parse_floor(&all_text);
    listing.bedrooms = patterns::parse_bedrooms(&all_text);
    listing.bathrooms = patterns::parse_bathrooms(&all_text);
    Ok(listing)
}

/// Last tier: every detail-page link on the page, mined from its surroundings
fn extract_from_links(document: &Html, rules: &SourceRules, ctx: &ExtractContext<'_>) -> Vec<Listing> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for pattern in rules.detail_links {
        let Some(selector) = compile(&format!(r#"a[href*="{pattern}"]"#)) else {
            continue;
        };
        for link in document.select(&selector) {
            if let Some(href) = link.value().attr("href") {
                if seen.insert(href.to_string()) {
                    links.push(link);
                }
            }
        }
    }

    info!("[{}] Found {} detail links", rules.source, links.len());

    let mut listings = Vec::new();
    for link in links.into_iter().take(ctx.limit) {
        let Some(url) = link.value().attr("href").and_then(|href| absolutize(rules.origin, href)) else {
            continue;
        };

        let container = enclosing_card(link);
        let text = element_text(container);

        let title = Some(element_text(link))
            .filter(|t| !t.is_empty())
            .or_else(|| first_text(container, &["h2", "h3"], 1))
            .unwrap_or_default();
        if title.is_empty() {
            debug!("[{}] Skipped link {}: no title", rules.source, url);
            continue;
        }

        let image = first_real_image(container, rules.origin).or_else(|| {
            parent_element(container).and_then(|parent| first_real_image(parent, rules.origin))
        });

        let mut listing = Listing::new(rules.source, title, ctx.city, url);
        listing.price = patterns::parse_price(&text).unwrap_or(0);
        listing.rooms = patterns::parse_rooms(&text).unwrap_or(0);
        listing.area = patterns::parse_area(&text).unwrap_or(0);
        listing.amenities = patterns::amenities(&text);
        listing.date = ctx.now;
        listing.image = image;
        listing.floor = patterns::parse_floor(&text);
        listings.push(listing);
    }

    listings
}

fn compile(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(err) => {
            warn!("Invalid selector {:?}: {}", css, err);
            None
        }
    }
}

/// Text content with whitespace runs collapsed
pub fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_match_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = compile(css)?;
    let text = element_text(element.select(&selector).next()?);
    (!text.is_empty()).then_some(text)
}

fn first_text(element: ElementRef<'_>, selectors: &[&str], min_len: usize) -> Option<String> {
    selectors
        .iter()
        .filter_map(|css| first_match_text(element, css))
        .find(|text| text.chars().count() >= min_len.max(1))
}

fn all_matches_text(element: ElementRef<'_>, selectors: &[&str]) -> String {
    let mut parts = Vec::new();
    for selector in selectors.iter().filter_map(|css| compile(css)) {
        parts.extend(element.select(&selector).map(element_text));
    }
    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

/// Any link whose text looks like a headline
fn link_text_title(element: ElementRef<'_>) -> Option<String> {
    let selector = compile("a")?;
    element
        .select(&selector)
        .map(element_text)
        .find(|text| (11..200).contains(&text.chars().count()))
}

fn card_link(card: ElementRef<'_>, rules: &SourceRules) -> Option<String> {
    let usable = |href: &str| !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:");

    for css in rules.link {
        let Some(selector) = compile(css) else {
            continue;
        };
        if let Some(href) = card.select(&selector).find_map(|a| a.value().attr("href")).filter(|h| usable(h)) {
            return Some(href.to_string());
        }
    }

    let anchors = compile("a[href]")?;
    let hrefs: Vec<&str> = card
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| usable(href))
        .collect();

    if let Some(href) = hrefs
        .iter()
        .find(|href| rules.detail_links.iter().any(|pattern| href.contains(pattern)))
    {
        return Some(href.to_string());
    }

    card.value()
        .attr("data-href")
        .or_else(|| card.value().attr("href"))
        .filter(|href| usable(href))
        .or_else(|| hrefs.first().copied())
        .map(str::to_string)
}

fn card_image(card: ElementRef<'_>, rules: &SourceRules) -> Option<String> {
    rules
        .image
        .iter()
        .filter_map(|css| compile(css))
        .find_map(|selector| card.select(&selector).next().and_then(|img| image_source(img, rules.origin)))
}

fn sibling_image(card: ElementRef<'_>, origin: &str) -> Option<String> {
    let img = compile("img")?;
    card.prev_siblings()
        .chain(card.next_siblings())
        .filter_map(ElementRef::wrap)
        .find_map(|sibling| sibling.select(&img).next().and_then(|el| image_source(el, origin)))
}

fn first_real_image(element: ElementRef<'_>, origin: &str) -> Option<String> {
    let img = compile("img")?;
    element
        .select(&img)
        .filter_map(|el| image_source(el, origin))
        .find(|src| !PLACEHOLDER_MARKERS.iter().any(|marker| src.contains(marker)))
}

fn image_source(img: ElementRef<'_>, origin: &str) -> Option<String> {
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .and_then(|src| absolutize(origin, src))
}

/// Nearest ancestor that looks like a listing card, widened when it is too small
fn enclosing_card(link: ElementRef<'_>) -> ElementRef<'_> {
    let looks_like_card = |el: &ElementRef<'_>| {
        matches!(el.value().name(), "article" | "li" | "section")
            || el.value().classes().any(|class| {
                let class = class.to_lowercase();
                class.contains("estate") || class.contains("item")
            })
    };

    let container = link
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(looks_like_card)
        .or_else(|| parent_element(link))
        .unwrap_or(link);

    if element_text(container).chars().count() < 50 {
        parent_element(container).unwrap_or(container)
    } else {
        container
    }
}

fn parent_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.parent().and_then(ElementRef::wrap)
}

fn unique_parents(elements: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let mut seen = HashSet::new();
    elements
        .into_iter()
        .filter_map(parent_element)
        .filter(|parent| seen.insert(parent.id()))
        .collect()
}

fn dedup_within_page(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::new();
    listings.into_iter().filter(|listing| seen.insert(listing.url.clone())).collect()
}

fn or_default_title(title: String) -> String {
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Resolve a possibly relative, quoted or protocol-relative link against the origin
pub fn absolutize(origin: &str, raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches(|c| matches!(c, '(' | '\'' | '"' | ' '))
        .trim_end_matches(|c| matches!(c, ')' | '\'' | '"' | ' '));
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok().map(String::from);
    }

    let base = Url::parse(origin).ok()?;
    let resolved = base.join(trimmed).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
