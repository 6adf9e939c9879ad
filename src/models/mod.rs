pub mod filters;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use filters::{FloorFilter, ListingFilters, SortOrder};

/// Source of the rental listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    Immowelt,
    Kleinanzeigen,
    #[serde(rename = "WG-Gesucht")]
    WgGesucht,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Immowelt, Source::Kleinanzeigen, Source::WgGesucht];

    /// Display name, also the value stored and serialized for the source
    pub fn name(&self) -> &'static str {
        match self {
            Source::Immowelt => "Immowelt",
            Source::Kleinanzeigen => "Kleinanzeigen",
            Source::WgGesucht => "WG-Gesucht",
        }
    }

    /// Query parameter that selects this source in a search request
    pub fn query_key(&self) -> &'static str {
        match self {
            Source::Immowelt => "immowelt",
            Source::Kleinanzeigen => "kleinanzeigen",
            Source::WgGesucht => "wgGesucht",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(s) || source.query_key() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown listing source: {s}"))
    }
}

/// Amenity flags mined from listing text.
///
/// Also used by [`ListingFilters`] as the set of flags a listing must carry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Amenities {
    pub furnished: bool,
    pub pets_allowed: bool,
    pub balcony: bool,
    pub parking: bool,
    pub kitchen: bool,
    pub garden: bool,
    pub lift: bool,
    #[serde(default)]
    pub garage: bool,
    #[serde(default)]
    pub keller: bool,
}

impl Amenities {
    /// Every flag set here must also be set on `other`
    pub fn satisfied_by(&self, other: &Amenities) -> bool {
        (!self.furnished || other.furnished)
            && (!self.pets_allowed || other.pets_allowed)
            && (!self.balcony || other.balcony)
            && (!self.parking || other.parking)
            && (!self.kitchen || other.kitchen)
            && (!self.garden || other.garden)
            && (!self.lift || other.lift)
            && (!self.garage || other.garage)
            && (!self.keller || other.keller)
    }
}

/// Normalized rental listing, the record every source produces.
///
/// `price`, `rooms` and `area` use 0 for "not parsed". `url` is absolute and
/// acts as the natural key of the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub source: Source,
    pub title: String,
    pub price: u32,
    pub rooms: u32,
    pub city: String,
    pub area: u32,
    #[serde(flatten)]
    pub amenities: Amenities,
    pub url: String,
    pub date: DateTime<Utc>,
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
}

impl Listing {
    /// Bare listing with unknown numeric fields and no amenities
    pub fn new(source: Source, title: impl Into<String>, city: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source,
            title: title.into(),
            price: 0,
            rooms: 0,
            city: city.into(),
            area: 0,
            amenities: Amenities::default(),
            url: url.into(),
            date: Utc::now(),
            image: None,
            address: None,
            description: None,
            floor: None,
            bedrooms: None,
            bathrooms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_flattened_camel_case_flags() {
        let mut listing = Listing::new(Source::WgGesucht, "Altbau", "Berlin", "https://www.wg-gesucht.de/1.html");
        listing.amenities.pets_allowed = true;
        listing.price = 650;

        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(value["source"], "WG-Gesucht");
        assert_eq!(value["petsAllowed"], true);
        assert_eq!(value["price"], 650);
        assert!(value["image"].is_null());
        assert!(value.get("floor").is_none());
    }

    #[test]
    fn source_parses_from_name_or_query_key() {
        assert_eq!("WG-Gesucht".parse::<Source>().unwrap(), Source::WgGesucht);
        assert_eq!("wgGesucht".parse::<Source>().unwrap(), Source::WgGesucht);
        assert_eq!("immowelt".parse::<Source>().unwrap(), Source::Immowelt);
        assert!("immoscout".parse::<Source>().is_err());
    }

    #[test]
    fn required_amenities_only_constrain_set_flags() {
        let required = Amenities { balcony: true, ..Default::default() };
        let with_balcony = Amenities { balcony: true, lift: true, ..Default::default() };
        assert!(required.satisfied_by(&with_balcony));
        assert!(!required.satisfied_by(&Amenities::default()));
        assert!(Amenities::default().satisfied_by(&Amenities::default()));
    }
}
