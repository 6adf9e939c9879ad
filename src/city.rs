use tracing::warn;

/// English and other foreign names that do not transliterate to the German slug
const CITY_ALIASES: &[(&str, &str)] = &[
    ("munich", "muenchen"),
    ("cologne", "koeln"),
    ("nuremberg", "nuernberg"),
    ("hanover", "hannover"),
    ("vienna", "wien"),
    ("zurich", "zuerich"),
    ("geneva", "genf"),
    ("prague", "prag"),
];

/// WG-Gesucht city identifiers. Spelling variants share an id.
const WG_CITY_IDS: &[(&str, u32)] = &[
    ("Aachen", 1),
    ("Augsburg", 2),
    ("Berlin", 8),
    ("Bielefeld", 10),
    ("Bochum", 11),
    ("Bonn", 13),
    ("Bremen", 14),
    ("Braunschweig", 15),
    ("Chemnitz", 20),
    ("Darmstadt", 24),
    ("Dresden", 27),
    ("Duisburg", 29),
    ("Dortmund", 33),
    ("Düsseldorf", 38),
    ("Duesseldorf", 38),
    ("Erfurt", 39),
    ("Essen", 40),
    ("Frankfurt", 41),
    ("Frankfurt am Main", 41),
    ("Freiburg", 43),
    ("Freiburg im Breisgau", 43),
    ("Gelsenkirchen", 46),
    ("Halle", 53),
    ("Hamburg", 55),
    ("Hannover", 57),
    ("Hanover", 57),
    ("Heidelberg", 59),
    ("Karlsruhe", 68),
    ("Kassel", 69),
    ("Kiel", 71),
    ("Köln", 73),
    ("Koeln", 73),
    ("Cologne", 73),
    ("Leverkusen", 76),
    ("Leipzig", 77),
    ("Lübeck", 78),
    ("Magdeburg", 79),
    ("Mainz", 80),
    ("Mannheim", 81),
    ("München", 90),
    ("Muenchen", 90),
    ("Munich", 90),
    ("Münster", 91),
    ("Muenster", 91),
    ("Nürnberg", 96),
    ("Nuernberg", 96),
    ("Nuremberg", 96),
    ("Oberhausen", 98),
    ("Oldenburg", 100),
    ("Osnabrück", 102),
    ("Paderborn", 103),
    ("Potsdam", 107),
    ("Regensburg", 109),
    ("Rostock", 113),
    ("Saarbrücken", 116),
    ("Stuttgart", 124),
    ("Trier", 126),
    ("Wiesbaden", 136),
    ("Würzburg", 141),
    ("Wuerzburg", 141),
];

/// URL slug for a city name: "Munich" -> "muenchen", "Bad Homburg" -> "bad-homburg".
///
/// Unknown cities pass through transliterated; this never fails.
pub fn normalize_city(city: &str) -> String {
    let lowered = city.trim().to_lowercase();

    if let Some((_, slug)) = CITY_ALIASES.iter().find(|(name, _)| *name == lowered) {
        return slug.to_string();
    }

    let transliterated = lowered
        .replace('ä', "ae")
        .replace('ö', "oe")
        .replace('ü', "ue")
        .replace('ß', "ss");

    transliterated.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Resolve the numeric WG-Gesucht id for a city.
///
/// Matching ignores case and umlauts. A purely numeric input is taken as an
/// id verbatim. Returns `None` for unknown cities; callers should then omit
/// the id from the search URL.
pub fn wg_city_id(city: &str) -> Option<String> {
    let wanted = fold_diacritics(city);
    if wanted.is_empty() {
        return None;
    }

    if let Some((_, id)) = WG_CITY_IDS.iter().find(|(name, _)| fold_diacritics(name) == wanted) {
        return Some(id.to_string());
    }

    if wanted.chars().all(|c| c.is_ascii_digit()) {
        return Some(wanted);
    }

    warn!("[WG-Gesucht] No city id known for \"{}\", searching without one", city);
    None
}

fn fold_diacritics(value: &str) -> String {
    let lowered = value
        .trim()
        .to_lowercase()
        .replace('ä', "a")
        .replace('ö', "o")
        .replace('ü', "u")
        .replace('ß', "ss");

    lowered.split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_german_slugs() {
        assert_eq!(normalize_city("Munich"), "muenchen");
        assert_eq!(normalize_city("  COLOGNE "), "koeln");
    }

    #[test]
    fn umlauts_and_spaces_are_transliterated() {
        assert_eq!(normalize_city("Düsseldorf"), "duesseldorf");
        assert_eq!(normalize_city("Straußberg"), "straussberg");
        assert_eq!(normalize_city("Frankfurt am Main"), "frankfurt-am-main");
        assert_eq!(normalize_city("Bad  Tölz"), "bad-toelz");
    }

    #[test]
    fn wg_ids_resolve_case_and_umlaut_insensitively() {
        assert_eq!(wg_city_id("Munich").as_deref(), Some("90"));
        assert_eq!(wg_city_id("münchen").as_deref(), Some("90"));
        assert_eq!(wg_city_id("MUNCHEN").as_deref(), Some("90"));
        assert_eq!(wg_city_id("Berlin").as_deref(), Some("8"));
        assert_eq!(wg_city_id("frankfurt am main").as_deref(), Some("41"));
    }

    #[test]
    fn numeric_input_is_a_literal_id() {
        assert_eq!(wg_city_id("4242").as_deref(), Some("4242"));
    }

    #[test]
    fn unknown_city_has_no_id() {
        assert_eq!(wg_city_id("Straußberg"), None);
        assert_eq!(wg_city_id(""), None);
    }
}
