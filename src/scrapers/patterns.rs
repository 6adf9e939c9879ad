//! Text-mining rules applied to a card's full text when no selector yields a
//! value. Each rule is a standalone function so it can be tested in isolation.

use crate::models::Amenities;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PRICE_PATTERNS: [Regex; 4] = [
        Regex::new(r"(\d{1,3}(?:\.\d{3})*)\s*€").unwrap(),
        Regex::new(r"(\d{1,3}(?:[ \u{a0}\u{202f}]\d{3})*)\s*€").unwrap(),
        Regex::new(r"€\s*(\d{1,3}(?:\.\d{3})*)").unwrap(),
        Regex::new(r"(\d{1,3}(?:\.\d{3})*)\s*EUR").unwrap(),
    ];
    // The count must not continue a longer number such as a date
    static ref ROOMS: Regex = Regex::new(r"(?i)(?:^|[^\d.,])(\d+(?:[,.]\d+)?)[\s-]*(?:Zimmer|Zi\.)").unwrap();
    static ref ROOMS_ZKB: Regex = Regex::new(r"(?i)(\d+)\s*ZKB").unwrap();
    static ref AREA: Regex = Regex::new(r"(?i)(\d+(?:[,.]\d+)?)\s*(?:m²|qm)").unwrap();
    static ref FLOOR_NUMBER: Regex = Regex::new(r"(?i)(\d+)\s*\.?\s*(?:OG|Obergeschoss|Etage|Stock)").unwrap();
    static ref FLOOR_GROUND: Regex = Regex::new(r"(?i)\b(?:EG|Erdgeschoss)\b").unwrap();
    static ref FLOOR_ATTIC: Regex = Regex::new(r"(?i)\b(?:DG|Dachgeschoss)\b").unwrap();
    static ref BEDROOMS: Regex = Regex::new(r"(?i)(\d+)\s*Schlafzimmer").unwrap();
    static ref BATHROOMS: Regex = Regex::new(r"(?i)(\d+)\s*(?:Badezimmer|Bäder|Bad\b)").unwrap();
    static ref HOURS_AGO: Regex = Regex::new(r"(?i)vor\s+(\d+)\s+Stunden?").unwrap();
    static ref DAYS_AGO: Regex = Regex::new(r"(?i)vor\s+(\d+)\s+Tagen?").unwrap();
    static ref CALENDAR_DATE: Regex = Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").unwrap();
}

/// Larger counts are dates or postcodes sitting next to the word "Zimmer"
const MAX_ROOMS: u32 = 20;

const BALCONY: &[&str] = &["balkon", "terrasse", "loggia"];
const KITCHEN: &[&str] = &["einbauküche", "ebk", "küche"];
const GARDEN: &[&str] = &["garten"];
const LIFT: &[&str] = &["aufzug", "fahrstuhl", "lift"];
const FURNISHED: &[&str] = &["möbliert"];
const PARKING: &[&str] = &["stellplatz", "garage", "parkplatz"];
const PETS: &[&str] = &["haustier"];
const GARAGE: &[&str] = &["garage"];
const KELLER: &[&str] = &["keller"];

/// Monthly rent from text such as "1.250 €", "1 250 €", "€ 950" or "800 EUR".
///
/// A dotted pattern only sees "250" in "1 250 €", so the widest match across
/// all patterns wins; on a tie the earlier pattern does.
pub fn parse_price(text: &str) -> Option<u32> {
    let mut best: Option<(usize, u32)> = None;

    for pattern in PRICE_PATTERNS.iter() {
        let Some(captured) = pattern.captures(text).and_then(|caps| caps.get(1)) else {
            continue;
        };
        let Some(price) = digits_only(captured.as_str()).filter(|price| *price > 0) else {
            continue;
        };
        if best.map_or(true, |(width, _)| captured.len() > width) {
            best = Some((captured.len(), price));
        }
    }

    best.map(|(_, price)| price)
}

/// All digits of the text read as one number: "1.250,- €" -> 1250
pub fn digits_only(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Room count, rounding half rooms: "2,5 Zimmer" -> 3, "3 ZKB" -> 3
pub fn parse_rooms(text: &str) -> Option<u32> {
    let rooms = match ROOMS.captures(text) {
        Some(caps) => parse_decimal(&caps[1]).map(|rooms| rooms.round() as u32),
        None => ROOMS_ZKB.captures(text).and_then(|caps| caps[1].parse().ok()),
    };
    rooms.filter(|rooms| *rooms <= MAX_ROOMS)
}

/// Floor area in whole square meters: "65,5 m²" -> 65
pub fn parse_area(text: &str) -> Option<u32> {
    AREA.captures(text)
        .and_then(|caps| parse_decimal(&caps[1]))
        .map(|area| area.trunc() as u32)
}

/// Floor label: "EG", "Dachgeschoss", "Penthouse" or the floor number
pub fn parse_floor(text: &str) -> Option<String> {
    if let Some(caps) = FLOOR_NUMBER.captures(text) {
        return Some(caps[1].to_string());
    }
    if FLOOR_GROUND.is_match(text) {
        return Some("EG".to_string());
    }
    if FLOOR_ATTIC.is_match(text) {
        return Some("Dachgeschoss".to_string());
    }
    text.to_lowercase()
        .contains("penthouse")
        .then(|| "Penthouse".to_string())
}

pub fn parse_bedrooms(text: &str) -> Option<u32> {
    BEDROOMS.captures(text).and_then(|caps| caps[1].parse().ok())
}

pub fn parse_bathrooms(text: &str) -> Option<u32> {
    BATHROOMS.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Listing date from relative or calendar text, relative to `now`
pub fn parse_listing_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = text.to_lowercase();

    if lowered.contains("heute") || lowered.contains("today") {
        return Some(now);
    }
    if lowered.contains("gestern") || lowered.contains("yesterday") {
        return Some(now - Duration::days(1));
    }
    // Absurd counts overflow the calendar and count as no date
    if let Some(caps) = HOURS_AGO.captures(text) {
        let hours = caps[1].parse().ok()?;
        return now.checked_sub_signed(Duration::try_hours(hours)?);
    }
    if let Some(caps) = DAYS_AGO.captures(text) {
        let days = caps[1].parse().ok()?;
        return now.checked_sub_signed(Duration::try_days(days)?);
    }

    let caps = CALENDAR_DATE.captures(text)?;
    let date = NaiveDate::from_ymd_opt(caps[3].parse().ok()?, caps[2].parse().ok()?, caps[1].parse().ok()?)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Amenity flags from German keywords anywhere in the text
pub fn amenities(text: &str) -> Amenities {
    let lowered = text.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));

    Amenities {
        furnished: has(FURNISHED),
        pets_allowed: has(PETS),
        balcony: has(BALCONY),
        parking: has(PARKING),
        kitchen: has(KITCHEN),
        garden: has(GARDEN),
        lift: has(LIFT),
        garage: has(GARAGE),
        keller: has(KELLER),
    }
}

fn parse_decimal(value: &str) -> Option<f64> {
    value.replace(',', ".").parse().ok()
}
