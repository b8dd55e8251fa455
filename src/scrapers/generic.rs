use scraper::{Html, Selector};
use tracing::debug;

use super::parse::{all_texts, first_text, image_urls, parse_number, parse_price, selector};
use super::traits::Normalizer;
use crate::error::ScrapeError;
use crate::models::{PartialProperty, PropertyType, ScraperConfig, Source};

/// Field names a [`ScraperConfig`] may map to selectors.
pub const FIELDS: &[&str] = &[
    "title",
    "price",
    "currency",
    "description",
    "address",
    "city",
    "county",
    "area",
    "rooms",
    "area_usable",
    "year_built",
    "type",
    "latitude",
    "longitude",
    "images",
    "features",
];

/// Config-driven scraper for sites without a dedicated normalizer
pub struct GenericScraper {
    domain: String,
    selectors: Vec<(&'static str, Selector)>,
}

impl GenericScraper {
    /// Compile the selectors of `config`. Unknown field names are ignored.
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let mut selectors = Vec::new();
        for field in FIELDS {
            if let Some(css) = config.selectors.get(*field) {
                selectors.push((*field, selector(field, css)?));
            }
        }
        for unknown in config.selectors.keys().filter(|k| !FIELDS.iter().any(|f| *f == k.as_str())) {
            debug!("Ignoring unknown field '{}' for {}", unknown, config.domain);
        }

        Ok(Self {
            domain: config.domain.clone(),
            selectors,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Normalizer for GenericScraper {
    fn normalize(&self, html: &str, url: &str) -> Result<PartialProperty, ScrapeError> {
        let document = Html::parse_document(html);
        let mut listing = PartialProperty {
            source: Some(Source::Generic),
            source_url: Some(url.to_string()),
            ..Default::default()
        };

        for (field, sel) in &self.selectors {
            match *field {
                "images" => listing.images = image_urls(&document, sel, url),
                "features" => listing.features = all_texts(&document, sel),
                _ => {
                    let Some(text) = first_text(&document, sel) else {
                        continue;
                    };
                    apply_text(&mut listing, field, &text);
                }
            }
        }

        if listing.title.is_none() {
            return Err(ScrapeError::MissingField("title"));
        }
        Ok(listing)
    }

    fn source(&self) -> Source {
        Source::Generic
    }
}

fn apply_text(listing: &mut PartialProperty, field: &str, text: &str) {
    match field {
        "title" => listing.title = Some(text.to_string()),
        "description" => listing.description = Some(text.to_string()),
        "price" => {
            if let Some((amount, currency)) = parse_price(text) {
                listing.price = Some(amount);
                listing.currency = listing.currency.take().or(currency);
            }
        }
        "currency" => listing.currency = Some(text.trim().to_uppercase()),
        "address" => listing.address = Some(text.to_string()),
        "city" => listing.city = Some(text.to_string()),
        "county" => listing.county = Some(text.to_string()),
        "area" => listing.area = Some(text.to_string()),
        "rooms" => listing.rooms = parse_number(text).map(|n| n as u32),
        "area_usable" => listing.area_usable = parse_number(text),
        "year_built" => listing.year_built = parse_number(text).map(|y| y as i32),
        "type" => listing.property_type = PropertyType::from_label(text),
        "latitude" => listing.latitude = text.trim().parse().ok(),
        "longitude" => listing.longitude = text.trim().parse().ok(),
        _ => {}
    }
}
