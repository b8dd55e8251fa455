use scraper::{Html, Selector};
use tracing::debug;

use super::parse::{
    all_texts, apply_labeled_field, element_text, first_text, image_urls, parse_price, selector,
};
use super::traits::Normalizer;
use crate::error::ScrapeError;
use crate::models::{PartialProperty, Source};

/// Normalizer for Immoflux CRM property pages
pub struct ImmofluxScraper {
    title: Selector,
    price: Selector,
    description: Selector,
    detail_rows: Selector,
    row_label: Selector,
    row_value: Selector,
    location_parts: Selector,
    map: Selector,
    gallery: Selector,
    features: Selector,
}

impl ImmofluxScraper {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            title: selector("title", "h1.property-title")?,
            price: selector("price", ".property-price")?,
            description: selector("description", ".property-description")?,
            detail_rows: selector("details", "table.property-details tr")?,
            row_label: selector("details", "th")?,
            row_value: selector("details", "td")?,
            location_parts: selector("location", "ul.property-location li")?,
            map: selector("map", "[data-lat][data-lng]")?,
            gallery: selector("images", ".property-gallery img")?,
            features: selector("features", "ul.property-features li")?,
        })
    }
}

impl Normalizer for ImmofluxScraper {
    fn normalize(&self, html: &str, url: &str) -> Result<PartialProperty, ScrapeError> {
        let document = Html::parse_document(html);

        // An expired CRM session serves the login form instead of the listing.
        let title = first_text(&document, &self.title).ok_or(ScrapeError::MissingField("title"))?;

        let mut listing = PartialProperty {
            source: Some(Source::Immoflux),
            source_url: Some(url.to_string()),
            title: Some(title),
            description: first_text(&document, &self.description),
            features: all_texts(&document, &self.features),
            images: image_urls(&document, &self.gallery, url),
            ..Default::default()
        };

        if let Some((amount, currency)) =
            first_text(&document, &self.price).and_then(|t| parse_price(&t))
        {
            listing.price = Some(amount);
            listing.currency = currency;
        }

        for part in document.select(&self.location_parts) {
            let value = element_text(&part);
            let label = match part.value().attr("class") {
                Some("county") => "judet",
                Some("city") => "localitate",
                Some("zone") => "zona",
                Some("street") => "adresa",
                _ => continue,
            };
            apply_labeled_field(&mut listing, label, &value);
        }

        for row in document.select(&self.detail_rows) {
            let label = row.select(&self.row_label).next().map(|e| element_text(&e));
            let value = row.select(&self.row_value).next().map(|e| element_text(&e));
            if let (Some(label), Some(value)) = (label, value) {
                apply_labeled_field(&mut listing, &label, &value);
            }
        }

        if let Some(map) = document.select(&self.map).next() {
            listing.latitude = map.value().attr("data-lat").and_then(|v| v.trim().parse().ok());
            listing.longitude = map.value().attr("data-lng").and_then(|v| v.trim().parse().ok());
        }

        debug!("Normalized Immoflux listing {}", url);
        Ok(listing)
    }

    fn source(&self) -> Source {
        Source::Immoflux
    }
}
