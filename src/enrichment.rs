//! Keyword and regex extraction of structured fields from listing text.
//!
//! Enrichment only fills gaps: a field that already has a value is never
//! touched. Scalar fields use ordered first-match-wins rule lists, feature
//! tags are additive.

use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;

use crate::models::{ListingType, PartialProperty, PropertyType};
use crate::scrapers::parse_number;

struct Rule<T> {
    value: T,
    any: &'static [&'static str],
    none: &'static [&'static str],
}

const fn rule<T>(value: T, any: &'static [&'static str]) -> Rule<T> {
    Rule { value, any, none: &[] }
}

const SEMI: &[&str] = &["semidecomandat", "semi decomandat"];
const NEDECOMANDAT: &[&str] = &["nedecomandat"];
const SEMI_OR_NEDECOMANDAT: &[&str] = &["semidecomandat", "semi decomandat", "nedecomandat"];

static PARTITIONING: &[Rule<&str>] = &[
    rule("Semidecomandat", SEMI),
    rule("Nedecomandat", NEDECOMANDAT),
    rule("Circular", &["circular"]),
    Rule {
        value: "Decomandat",
        any: &["decomandat"],
        none: SEMI_OR_NEDECOMANDAT,
    },
];

static INTERIOR_CONDITION: &[Rule<&str>] = &[
    rule(
        "Necesită renovare",
        &["necesita renovare", "de renovat", "necesita reparatii", "necesita investitii"],
    ),
    rule(
        "Nou",
        &["constructie noua", "bloc nou", "imobil nou", "casa noua", "prima inchiriere", "nelocuit"],
    ),
    rule("Renovat", &["renovat", "modernizat"]),
    rule("Bun", &["stare buna", "stare foarte buna", "stare excelenta"]),
];

const NOT_FULLY_FURNISHED: &[&str] = &[
    "nemobilat",
    "semimobilat",
    "semi mobilat",
    "partial mobilat",
    "fara mobila",
];

static FURNISHING: &[Rule<&str>] = &[
    rule("Nemobilat", &["nemobilat", "fara mobila"]),
    rule("Semimobilat", &["semimobilat", "semi mobilat", "partial mobilat"]),
    Rule {
        value: "Mobilat",
        any: &["mobilat"],
        none: NOT_FULLY_FURNISHED,
    },
];

static PROPERTY_TYPE: &[Rule<PropertyType>] = &[
    rule(PropertyType::Apartment, &["apartament", "garsoniera"]),
    rule(PropertyType::House, &[" casa ", " vila ", "casa individuala"]),
    rule(
        PropertyType::Commercial,
        &["spatiu comercial", "spatiu de birouri", "spatiu birouri", " birou ", " hala "],
    ),
    rule(PropertyType::Land, &[" teren "]),
];

static LISTING_TYPE: &[Rule<ListingType>] = &[
    rule(ListingType::ForRent, &["inchiriere", "de inchiriat", " chirie "]),
    rule(ListingType::ForSale, &["vanzare", " vand ", "de vanzare"]),
];

/// Tag appended when any of its keywords appears in the text.
static FEATURES: &[(&str, &[&str])] = &[
    ("Balcon", &["balcon"]),
    ("Terasă", &["terasa"]),
    ("Loc de parcare", &["parcare"]),
    ("Garaj", &["garaj"]),
    ("Lift", &[" lift "]),
    ("Centrală proprie", &["centrala proprie", "centrala termica", "centrala pe gaz"]),
    ("Aer condiționat", &["aer conditionat", "climatizare"]),
    ("Boxă", &[" boxa "]),
    ("Grădină", &["gradina"]),
    ("Piscină", &["piscina"]),
    ("Interfon", &["interfon"]),
    ("Termopan", &["termopan"]),
    ("Izolat termic", &["izolat termic", "izolatie termica", "anvelopat"]),
    ("Pet friendly", &["pet friendly", "animale acceptate"]),
];

static COMFORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bconfort\s*(lux|iii|ii|i|[123])\b").expect("comfort pattern"));
static ROOMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\s*camere\b").expect("rooms pattern"));
/// A whole number token: `1.250`, `1.250,5`, `65,5` or `120`.
const AREA_NUMBER: &str = r"(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:[.,]\d{1,2})?)";

static USABLE_AREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"suprafata utila\D{{0,20}}?{AREA_NUMBER}(?:\s*(?:mp|m2|m²|metri)|[^\d.,]|$)"))
        .expect("usable area pattern")
});
static ANY_AREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{AREA_NUMBER}\s*(?:mp|m2|m²|metri patrati)")).expect("area pattern")
});
static YEAR_BUILT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:construit[a]?|constructie|constructiei)\D{0,25}?\b((?:18|19|20)\d{2})\b")
        .expect("year pattern")
});

const EARLIEST_YEAR: i32 = 1800;
/// Off-plan listings may announce a completion year a little ahead.
const MAX_YEARS_AHEAD: i32 = 5;

/// Fill missing fields of `current` from the listing text.
///
/// Applying it twice to the same text yields the same record as applying it
/// once.
#[must_use]
pub fn enrich(description: &str, mut current: PartialProperty) -> PartialProperty {
    let folded = fold(description);
    let words = word_text(&folded);

    fill(&mut current.partitioning, || first_match(&words, PARTITIONING).map(str::to_string));
    fill(&mut current.comfort, || comfort(&folded));
    fill(&mut current.interior_condition, || {
        first_match(&words, INTERIOR_CONDITION).map(str::to_string)
    });
    fill(&mut current.furnishing, || first_match(&words, FURNISHING).map(str::to_string));
    fill(&mut current.property_type, || first_match(&words, PROPERTY_TYPE));
    fill(&mut current.listing_type, || first_match(&words, LISTING_TYPE));
    fill(&mut current.rooms, || rooms(&folded, &words));
    fill(&mut current.area_usable, || usable_area(&folded));
    fill(&mut current.year_built, || year_built(&folded));

    for (tag, keywords) in FEATURES {
        let present = current.features.iter().any(|f| f == tag);
        if !present && keywords.iter().any(|k| words.contains(k)) {
            current.features.push((*tag).to_string());
        }
    }
    dedup_in_order(&mut current.features);

    current
}

fn fill<T>(slot: &mut Option<T>, infer: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = infer();
    }
}

fn first_match<T: Copy>(words: &str, rules: &[Rule<T>]) -> Option<T> {
    rules
        .iter()
        .find(|r| r.any.iter().any(|k| words.contains(k)) && !r.none.iter().any(|k| words.contains(k)))
        .map(|r| r.value)
}

fn comfort(folded: &str) -> Option<String> {
    let caps = COMFORT.captures(folded)?;
    let level = match caps.get(1)?.as_str() {
        "lux" => "Lux",
        "1" | "i" => "1",
        "2" | "ii" => "2",
        "3" | "iii" => "3",
        _ => return None,
    };
    Some(level.to_string())
}

fn rooms(folded: &str, words: &str) -> Option<u32> {
    if let Some(n) = ROOMS
        .captures(folded)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
    {
        return Some(n);
    }
    words.contains("garsoniera").then_some(1)
}

fn usable_area(folded: &str) -> Option<f64> {
    [&*USABLE_AREA, &*ANY_AREA].into_iter().find_map(|re| {
        re.captures(folded)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_number(m.as_str()))
            .filter(|a| *a > 0.0)
    })
}

fn year_built(folded: &str) -> Option<i32> {
    YEAR_BUILT
        .captures(folded)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .filter(|y| plausible_year(*y))
}

/// Construction years from 1800 up to a few years ahead.
pub(crate) fn plausible_year(year: i32) -> bool {
    (EARLIEST_YEAR..=Utc::now().year() + MAX_YEARS_AHEAD).contains(&year)
}

/// Lower-case and strip Romanian diacritics.
pub(crate) fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'ă' | 'â' => 'a',
            'î' => 'i',
            'ș' | 'ş' => 's',
            'ț' | 'ţ' => 't',
            other => other,
        })
        .collect()
}

/// Punctuation collapsed to single spaces and padded, so keywords written
/// with surrounding spaces match whole words only.
fn word_text(folded: &str) -> String {
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", spaced.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn dedup_in_order(tags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| seen.insert(t.clone()));
}
