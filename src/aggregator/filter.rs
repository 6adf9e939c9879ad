//! Post-scrape filtering, sorting and deduplication.
//!
//! Scraped numbers are unreliable: 0 (or a missing value) means "not parsed",
//! so such listings pass the corresponding bound instead of being dropped.

use crate::models::{Listing, ListingFilters, SortOrder};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Whether a listing satisfies every constraint in `filters`
pub fn matches(listing: &Listing, filters: &ListingFilters) -> bool {
    if !filters.allows_source(listing.source) {
        return false;
    }

    within(listing.price, filters.min_price, filters.max_price)
        && within(listing.rooms, filters.rooms, filters.max_rooms)
        && within(listing.area, filters.min_area, filters.max_area)
        && at_least(listing.bedrooms, filters.bedrooms)
        && at_least(listing.bathrooms, filters.bathrooms)
        && filters.amenities.satisfied_by(&listing.amenities)
        && match (&filters.floor, &listing.floor) {
            (Some(wanted), Some(floor)) => wanted.matches(floor),
            _ => true,
        }
}

pub fn apply_filters(listings: Vec<Listing>, filters: &ListingFilters) -> Vec<Listing> {
    listings.into_iter().filter(|listing| matches(listing, filters)).collect()
}

/// Stable sort, so equal keys keep source concatenation order
pub fn sort_listings(mut listings: Vec<Listing>, order: SortOrder) -> Vec<Listing> {
    match order {
        SortOrder::Newest => listings.sort_by_key(|l| Reverse(l.date)),
        SortOrder::PriceAsc => listings.sort_by_key(|l| l.price),
        SortOrder::PriceDesc => listings.sort_by_key(|l| Reverse(l.price)),
        SortOrder::AreaAsc => listings.sort_by_key(|l| l.area),
        SortOrder::AreaDesc => listings.sort_by_key(|l| Reverse(l.area)),
    }
    listings
}

/// Keep the first listing seen for each url
pub fn dedup_by_url(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.url.clone()))
        .collect()
}

/// Filter, dedup and sort a result set. Dedup runs before the sort so the
/// surviving duplicate is the first in source order.
pub fn refine(listings: Vec<Listing>, filters: &ListingFilters) -> Vec<Listing> {
    sort_listings(dedup_by_url(apply_filters(listings, filters)), filters.sort)
}

fn within(value: u32, min: Option<u32>, max: Option<u32>) -> bool {
    if value == 0 {
        return true;
    }
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

fn at_least(value: Option<u32>, min: Option<u32>) -> bool {
    match (value, min) {
        (Some(value), Some(min)) if value > 0 => value >= min,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amenities, FloorFilter, Source};
    use chrono::{Duration, TimeZone, Utc};

    fn listing(url: &str, price: u32, area: u32) -> Listing {
        let mut listing = Listing::new(Source::Immowelt, "Wohnung", "Berlin", url);
        listing.price = price;
        listing.area = area;
        listing
    }

    fn with_floor(url: &str, floor: &str) -> Listing {
        let mut listing = listing(url, 900, 60);
        listing.floor = Some(floor.to_string());
        listing
    }

    #[test]
    fn price_bounds_treat_zero_as_unknown() {
        let filters = ListingFilters {
            min_price: Some(500),
            max_price: Some(1000),
            ..Default::default()
        };
        let kept = apply_filters(
            vec![
                listing("https://a.de/cheap", 400, 0),
                listing("https://a.de/ok", 750, 0),
                listing("https://a.de/unknown", 0, 0),
                listing("https://a.de/pricey", 1200, 0),
            ],
            &filters,
        );
        let urls: Vec<&str> = kept.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, ["https://a.de/ok", "https://a.de/unknown"]);
    }

    #[test]
    fn rooms_area_and_bedroom_bounds() {
        let mut three = listing("https://a.de/3", 900, 80);
        three.rooms = 3;
        three.bedrooms = Some(2);
        let mut one = listing("https://a.de/1", 600, 30);
        one.rooms = 1;
        one.bedrooms = Some(1);

        let filters = ListingFilters {
            rooms: Some(2),
            max_rooms: Some(4),
            min_area: Some(50),
            bedrooms: Some(2),
            ..Default::default()
        };
        assert!(matches(&three, &filters));
        assert!(!matches(&one, &filters));

        // No bedroom count parsed: the bedroom bound does not apply
        three.bedrooms = None;
        assert!(matches(&three, &filters));
    }

    #[test]
    fn amenity_flags_must_be_present_when_requested() {
        let mut with_balcony = listing("https://a.de/b", 900, 60);
        with_balcony.amenities.balcony = true;
        let plain = listing("https://a.de/p", 900, 60);

        let filters = ListingFilters {
            amenities: Amenities { balcony: true, ..Default::default() },
            ..Default::default()
        };
        assert!(matches(&with_balcony, &filters));
        assert!(!matches(&plain, &filters));

        // Unrequested flags never exclude anything
        assert!(matches(&plain, &ListingFilters::default()));
    }

    #[test]
    fn floor_categories() {
        let ground = FloorFilter::parse("0");
        let three_plus = FloorFilter::parse("3+");
        let attic = FloorFilter::parse("dachgeschoss");
        let second = FloorFilter::parse("2");

        let filters = |floor: &Option<FloorFilter>| ListingFilters { floor: floor.clone(), ..Default::default() };

        assert!(matches(&with_floor("https://a.de/eg", "EG"), &filters(&ground)));
        assert!(matches(&with_floor("https://a.de/12", "12"), &filters(&three_plus)));
        assert!(!matches(&with_floor("https://a.de/2", "2"), &filters(&three_plus)));
        assert!(matches(&with_floor("https://a.de/dg", "Dachgeschoss"), &filters(&attic)));
        assert!(!matches(&with_floor("https://a.de/dg", "Dachgeschoss"), &filters(&second)));

        // Unknown floor passes
        assert!(matches(&listing("https://a.de/x", 900, 60), &filters(&three_plus)));
    }

    #[test]
    fn source_allow_list() {
        let filters = ListingFilters {
            sources: Some(vec![Source::Kleinanzeigen]),
            ..Default::default()
        };
        assert!(!matches(&listing("https://a.de/i", 900, 60), &filters));

        let mut other = listing("https://a.de/k", 900, 60);
        other.source = Source::Kleinanzeigen;
        assert!(matches(&other, &filters));
    }

    #[test]
    fn price_sorts_are_monotonic() {
        let input = vec![
            listing("https://a.de/1", 900, 0),
            listing("https://a.de/2", 450, 0),
            listing("https://a.de/3", 1300, 0),
            listing("https://a.de/4", 0, 0),
        ];

        let asc = sort_listings(input.clone(), SortOrder::PriceAsc);
        assert!(asc.windows(2).all(|w| w[0].price <= w[1].price));

        let desc = sort_listings(input, SortOrder::PriceDesc);
        assert!(desc.windows(2).all(|w| w[0].price >= w[1].price));
    }

    #[test]
    fn newest_first_and_area_with_missing_as_zero() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut input = Vec::new();
        for (i, (days, area)) in [(2, 70), (5, 0), (1, 45)].into_iter().enumerate() {
            let mut l = listing(&format!("https://a.de/{i}"), 900, area);
            l.date = base + Duration::days(days);
            input.push(l);
        }

        let newest = sort_listings(input.clone(), SortOrder::Newest);
        assert!(newest.windows(2).all(|w| w[0].date >= w[1].date));
        assert_eq!(newest[0].url, "https://a.de/1");

        let area_asc = sort_listings(input.clone(), SortOrder::AreaAsc);
        let areas: Vec<u32> = area_asc.iter().map(|l| l.area).collect();
        assert_eq!(areas, [0, 45, 70]);

        let area_desc = sort_listings(input, SortOrder::AreaDesc);
        assert_eq!(area_desc[0].area, 70);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut first = listing("https://a.de/same", 800, 0);
        first.title = "first".to_string();
        let mut second = listing("https://a.de/same", 900, 0);
        second.title = "second".to_string();

        let deduped = dedup_by_url(vec![first.clone(), listing("https://a.de/other", 1, 0), second.clone()]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");

        // Sorting by price would put the second copy first; source order still wins
        let filters = ListingFilters { sort: SortOrder::PriceDesc, ..Default::default() };
        let refined = refine(vec![first, second], &filters);
        assert_eq!(refined.len(), 1);
        assert_eq!(refined[0].title, "first");
    }
}
