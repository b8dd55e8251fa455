//! Content fingerprint used to spot the same listing across scrape sources.
//!
//! The key is coarse: location strings lose case and punctuation
//! and the price is bucketed to the nearest 1000, so the same flat listed on
//! two marketplaces with slightly different formatting hashes identically.
//! Two different flats in one building with the same room count and a
//! similar price will collide.

use sha2::{Digest, Sha256};

use crate::models::PartialProperty;

const PRICE_BUCKET: f64 = 1000.0;

/// SHA-256 hex digest of the normalized identity of a listing.
///
/// ```
/// use estate_scout::fingerprint::fingerprint;
/// use estate_scout::models::PartialProperty;
///
/// let fp = fingerprint(&PartialProperty::default());
/// assert_eq!(fp.len(), 64);
/// ```
#[must_use]
pub fn fingerprint(record: &PartialProperty) -> String {
    let mut hasher = Sha256::new();
    hasher.update(composite_key(record).as_bytes());
    hex::encode(hasher.finalize())
}

fn composite_key(record: &PartialProperty) -> String {
    let location = [&record.city, &record.area, &record.address]
        .into_iter()
        .map(|part| part.as_deref().map(normalize_text).unwrap_or_default())
        .collect::<String>();

    let rooms = record.rooms.unwrap_or(0).to_string();
    let price = price_bucket(record.price);
    let kind = record
        .property_type
        .map(|t| normalize_text(t.label()))
        .unwrap_or_default();

    format!("{location}_R:{rooms}_P:{price}_T:{kind}")
}

/// Lower-case and keep only `[a-z0-9]`.
pub fn normalize_text(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn price_bucket(price: Option<f64>) -> String {
    match price {
        Some(p) if p.is_finite() => {
            let bucket = (p / PRICE_BUCKET).round() * PRICE_BUCKET;
            format!("{}", bucket as i64)
        }
        _ => "0".to_string(),
    }
}
