use scraper::{Html, Selector};
use tracing::{debug, info};

use super::parse::{
    absolutize, apply_labeled_field, element_text, first_text, image_urls, parse_price, selector,
};
use super::traits::Normalizer;
use crate::error::ScrapeError;
use crate::models::{PartialProperty, Source};

/// Publi24 classifieds: result pages list ad links, ad pages carry the
/// listing in schema.org microdata.
pub struct Publi24Scraper {
    ad_links: Selector,
    title: Selector,
    price: Selector,
    currency: Selector,
    description: Selector,
    locality: Selector,
    region: Selector,
    attributes: Selector,
    attribute_label: Selector,
    attribute_value: Selector,
    images: Selector,
}

impl Publi24Scraper {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            ad_links: selector("links", "a[href*='/anunt/']")?,
            title: selector("title", "h1[itemprop='name'], h1")?,
            price: selector("price", "[itemprop='price']")?,
            currency: selector("currency", "[itemprop='priceCurrency']")?,
            description: selector("description", "[itemprop='description']")?,
            locality: selector("city", "[itemprop='addressLocality']")?,
            region: selector("county", "[itemprop='addressRegion']")?,
            attributes: selector("attributes", ".attribute-item")?,
            attribute_label: selector("attributes", ".attribute-label")?,
            attribute_value: selector("attributes", ".attribute-value")?,
            images: selector("images", "[itemprop='image']")?,
        })
    }

    /// Absolute ad URLs on a search results page, in page order, without
    /// duplicates.
    pub fn listing_links(&self, html: &str, page_url: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut links: Vec<String> = Vec::new();

        for element in document.select(&self.ad_links) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.split(['?', '#']).next().unwrap_or(href);
            if !href.ends_with(".html") {
                continue;
            }
            if let Some(url) = absolutize(page_url, href) {
                if !links.contains(&url) {
                    links.push(url);
                }
            }
        }

        info!("Found {} ad links on {}", links.len(), page_url);
        links
    }
}

impl Normalizer for Publi24Scraper {
    fn normalize(&self, html: &str, url: &str) -> Result<PartialProperty, ScrapeError> {
        let document = Html::parse_document(html);
        let title = first_text(&document, &self.title).ok_or(ScrapeError::MissingField("title"))?;

        let mut listing = PartialProperty {
            source: Some(Source::Publi24),
            source_url: Some(url.to_string()),
            title: Some(title),
            description: first_text(&document, &self.description),
            city: first_text(&document, &self.locality),
            county: first_text(&document, &self.region),
            images: image_urls(&document, &self.images, url),
            ..Default::default()
        };

        if let Some((amount, currency)) =
            first_text(&document, &self.price).and_then(|t| parse_price(&t))
        {
            listing.price = Some(amount);
            listing.currency = first_text(&document, &self.currency)
                .map(|c| c.to_uppercase())
                .or(currency);
        }

        for item in document.select(&self.attributes) {
            let label = item.select(&self.attribute_label).next().map(|e| element_text(&e));
            let value = item.select(&self.attribute_value).next().map(|e| element_text(&e));
            if let (Some(label), Some(value)) = (label, value) {
                apply_labeled_field(&mut listing, &label, &value);
            }
        }

        debug!("Normalized Publi24 ad {}", url);
        Ok(listing)
    }

    fn source(&self) -> Source {
        Source::Publi24
    }
}
