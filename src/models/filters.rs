use super::{Amenities, Source};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CITY: &str = "Berlin";

/// Sort order for search results
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    AreaAsc,
    AreaDesc,
}

impl SortOrder {
    /// Unknown values fall back to newest-first
    pub fn parse(value: &str) -> Self {
        match value {
            "priceAsc" => SortOrder::PriceAsc,
            "priceDesc" => SortOrder::PriceDesc,
            "areaAsc" => SortOrder::AreaAsc,
            "areaDesc" => SortOrder::AreaDesc,
            _ => SortOrder::Newest,
        }
    }
}

/// Floor category requested by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloorFilter {
    /// "0", "EG" or "ground"
    Ground,
    /// "3+": numeric floor of at least the given value
    AtLeast(u32),
    /// "dachgeschoss" / "penthouse"
    Keyword(String),
    /// Anything else, matched as a substring
    Literal(String),
}

impl FloorFilter {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        if value.is_empty() {
            return None;
        }

        if is_ground_floor(&value) {
            return Some(FloorFilter::Ground);
        }
        if let Some(min) = value.strip_suffix('+').and_then(|n| n.trim().parse().ok()) {
            return Some(FloorFilter::AtLeast(min));
        }
        if value.contains("dachgeschoss") || value.contains("penthouse") {
            return Some(FloorFilter::Keyword(value));
        }
        Some(FloorFilter::Literal(value))
    }

    /// Whether a scraped floor value falls in this category
    pub fn matches(&self, floor: &str) -> bool {
        let floor = floor.trim().to_lowercase();
        match self {
            FloorFilter::Ground => is_ground_floor(&floor),
            FloorFilter::AtLeast(min) => leading_number(&floor).is_some_and(|n| n >= *min),
            FloorFilter::Keyword(keyword) => floor.contains(keyword.as_str()),
            FloorFilter::Literal(literal) => floor.contains(literal.as_str()),
        }
    }
}

fn is_ground_floor(value: &str) -> bool {
    matches!(value, "0" | "eg" | "ground" | "erdgeschoss")
}

fn leading_number(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Search criteria parsed from the query string.
///
/// Every optional field left as `None` (or flag left `false`) means "no
/// constraint".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilters {
    pub city: String,
    pub min_price: Option<u32>,
    pub max_price: Option<u32>,
    /// Minimum number of rooms
    pub rooms: Option<u32>,
    pub max_rooms: Option<u32>,
    pub min_area: Option<u32>,
    pub max_area: Option<u32>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub floor: Option<FloorFilter>,
    /// Flags a listing must carry
    pub amenities: Amenities,
    /// `None` selects every source
    pub sources: Option<Vec<Source>>,
    pub sort: SortOrder,
}

impl Default for ListingFilters {
    fn default() -> Self {
        Self {
            city: DEFAULT_CITY.to_string(),
            min_price: None,
            max_price: None,
            rooms: None,
            max_rooms: None,
            min_area: None,
            max_area: None,
            bedrooms: None,
            bathrooms: None,
            floor: None,
            amenities: Amenities::default(),
            sources: None,
            sort: SortOrder::Newest,
        }
    }
}

impl ListingFilters {
    /// Build filters from a raw `a=1&b=2` query string.
    ///
    /// Repeated keys keep their first value. Numbers that do not parse are
    /// treated as absent.
    pub fn from_query(raw: &str) -> Self {
        let mut filters = ListingFilters::default();
        let mut seen = std::collections::HashSet::new();
        let mut sources = Vec::new();

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            if !seen.insert(key.to_string()) {
                continue;
            }
            let value = value.trim();

            match key.as_ref() {
                "city" if !value.is_empty() => filters.city = value.to_string(),
                "minPrice" => filters.min_price = parse_number(value),
                "maxPrice" => filters.max_price = parse_number(value),
                "rooms" => filters.rooms = parse_number(value),
                "maxRooms" => filters.max_rooms = parse_number(value),
                "minArea" => filters.min_area = parse_number(value),
                "maxArea" => filters.max_area = parse_number(value),
                "bedrooms" => filters.bedrooms = parse_number(value),
                "bathrooms" => filters.bathrooms = parse_number(value),
                "floor" => filters.floor = FloorFilter::parse(value),
                "sort" => filters.sort = SortOrder::parse(value),
                "furnished" => filters.amenities.furnished = is_true(value),
                "petsAllowed" => filters.amenities.pets_allowed = is_true(value),
                "balcony" => filters.amenities.balcony = is_true(value),
                "parking" => filters.amenities.parking = is_true(value),
                "kitchen" => filters.amenities.kitchen = is_true(value),
                "garden" => filters.amenities.garden = is_true(value),
                "lift" => filters.amenities.lift = is_true(value),
                "garage" => filters.amenities.garage = is_true(value),
                "keller" => filters.amenities.keller = is_true(value),
                other => {
                    if let Some(source) = Source::ALL.into_iter().find(|s| s.query_key() == other) {
                        if is_true(value) {
                            sources.push(source);
                        }
                    }
                }
            }
        }

        if !sources.is_empty() {
            filters.sources = Some(sources);
        }
        filters
    }

    pub fn allows_source(&self, source: Source) -> bool {
        self.sources.as_ref().map_or(true, |allowed| allowed.contains(&source))
    }
}

fn parse_number(value: &str) -> Option<u32> {
    value.parse().ok()
}

fn is_true(value: &str) -> bool {
    value == "true"
}
