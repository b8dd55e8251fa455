//! Text helpers shared by the normalizers.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::enrichment::{fold, plausible_year};
use crate::error::ScrapeError;
use crate::models::{ListingType, PartialProperty, PropertyType};

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:[ \u{a0}.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d+)?").expect("number pattern")
});

pub fn selector(field: &str, css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|_| ScrapeError::Selector {
        field: field.to_string(),
        selector: css.to_string(),
    })
}

/// First number in `text`, accepting `.` or `,` as either thousands or
/// decimal separator ("90.000" → 90000, "65,5" → 65.5, "1.250,50" → 1250.5).
pub fn parse_number(text: &str) -> Option<f64> {
    let raw: String = NUMBER
        .find(text)?
        .as_str()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let dots = raw.matches('.').count();
    let commas = raw.matches(',').count();
    let cleaned = match (dots, commas) {
        (0, 0) => raw,
        (_, 0) | (0, _) => {
            let sep = if dots > 0 { '.' } else { ',' };
            let count = dots.max(commas);
            let tail = raw.rsplit(sep).next().map_or(0, str::len);
            if count > 1 || tail == 3 {
                raw.replace(sep, "")
            } else {
                raw.replace(sep, ".")
            }
        }
        _ => {
            let last_dot = raw.rfind('.');
            let last_comma = raw.rfind(',');
            if last_comma > last_dot {
                raw.replace('.', "").replace(',', ".")
            } else {
                raw.replace(',', "")
            }
        }
    };
    cleaned.parse().ok()
}

pub fn detect_currency(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let code = if lower.contains('€') || lower.contains("eur") {
        "EUR"
    } else if lower.contains("lei") || lower.contains("ron") {
        "RON"
    } else if lower.contains('$') || lower.contains("usd") {
        "USD"
    } else {
        return None;
    };
    Some(code.to_string())
}

/// Price and currency from text such as "90.000 €" or "450 EUR/lună".
pub fn parse_price(text: &str) -> Option<(f64, Option<String>)> {
    let amount = parse_number(text).filter(|p| *p > 0.0)?;
    Some((amount, detect_currency(text)))
}

/// Element text with whitespace collapsed.
pub fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first match, `content` attribute first (for meta/microdata).
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    let element = document.select(selector).next()?;
    let value = element
        .value()
        .attr("content")
        .map(|c| c.trim().to_string())
        .unwrap_or_else(|| element_text(&element));
    (!value.is_empty()).then_some(value)
}

pub fn all_texts(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Image URLs of every match, resolved against the page URL.
pub fn image_urls(document: &Html, selector: &Selector, page_url: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for element in document.select(selector) {
        let attrs = element.value();
        let Some(src) = attrs
            .attr("data-src")
            .or_else(|| attrs.attr("src"))
            .or_else(|| attrs.attr("content"))
        else {
            continue;
        };
        if let Some(url) = absolutize(page_url, src) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

pub fn absolutize(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(String::from)
}

fn capitalized(value: &str) -> String {
    let mut chars = value.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Store a "label: value" pair from a detail table into `listing`.
/// Unknown labels are ignored; known fields are only set once.
pub fn apply_labeled_field(listing: &mut PartialProperty, label: &str, value: &str) {
    let label = fold(label.trim().trim_end_matches(':'));
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    match label.as_str() {
        "tip proprietate" | "tip imobil" | "tip" => {
            if listing.property_type.is_none() {
                listing.property_type = PropertyType::from_label(&fold(value));
            }
        }
        "tranzactie" | "tip tranzactie" | "tip oferta" => {
            if listing.listing_type.is_none() {
                let folded = fold(value);
                listing.listing_type = if folded.contains("inchiri") {
                    Some(ListingType::ForRent)
                } else if folded.contains("vanzare") {
                    Some(ListingType::ForSale)
                } else {
                    None
                };
            }
        }
        "suprafata utila" | "suprafata" | "suprafata utila (mp)" => {
            listing.area_usable = listing.area_usable.or_else(|| parse_number(value));
        }
        "nr camere" | "nr. camere" | "numar camere" | "camere" => {
            listing.rooms = listing
                .rooms
                .or_else(|| parse_number(value).map(|n| n as u32).filter(|n| *n > 0));
        }
        "an constructie" | "anul constructiei" | "an finalizare" => {
            listing.year_built = listing.year_built.or_else(|| {
                parse_number(value)
                    .filter(|y| y.fract() == 0.0)
                    .map(|y| y as i32)
                    .filter(|y| plausible_year(*y))
            });
        }
        "compartimentare" => set_once(&mut listing.partitioning, capitalized(value)),
        "confort" => set_once(&mut listing.comfort, capitalized(value)),
        "stare" | "stare interior" | "stare imobil" => {
            set_once(&mut listing.interior_condition, capitalized(value))
        }
        "mobilat" | "mobilare" | "mobilier" => set_once(&mut listing.furnishing, capitalized(value)),
        "judet" => set_once(&mut listing.county, value.to_string()),
        "localitate" | "oras" => set_once(&mut listing.city, value.to_string()),
        "zona" | "cartier" => set_once(&mut listing.area, value.to_string()),
        "adresa" | "strada" => set_once(&mut listing.address, value.to_string()),
        _ => {}
    }
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}
