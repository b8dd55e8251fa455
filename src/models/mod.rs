use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source of a scraped listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Source {
    Generic,
    Immoflux,
    Publi24,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Generic => "generic",
            Source::Immoflux => "immoflux",
            Source::Publi24 => "publi24",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Apartment,
    House,
    Land,
    Commercial,
}

impl PropertyType {
    pub fn label(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "Apartment",
            PropertyType::House => "House",
            PropertyType::Land => "Land",
            PropertyType::Commercial => "Commercial",
        }
    }

    /// Parse a type label as found in scraper configs or page text.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "apartment" | "apartament" | "garsoniera" => Some(PropertyType::Apartment),
            "house" | "casa" | "vila" => Some(PropertyType::House),
            "land" | "teren" => Some(PropertyType::Land),
            "commercial" | "spatiu comercial" | "comercial" => Some(PropertyType::Commercial),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ListingType {
    #[default]
    ForSale,
    ForRent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ListingStatus {
    #[default]
    Draft,
    Active,
}

/// Location information for a property
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub county: Option<String>,
    pub city: String,
    pub area: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Core property data model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub location: Location,
    pub area_usable: Option<f64>,
    pub rooms: u32,
    pub year_built: Option<i32>,
    pub features: Vec<String>,
    pub partitioning: Option<String>,
    pub comfort: Option<String>,
    pub interior_condition: Option<String>,
    pub furnishing: Option<String>,
    pub status: ListingStatus,
    pub source: Option<Source>,
    pub source_url: Option<String>,
    pub fingerprint: Option<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// Both coordinates are known, so the property can take part in
    /// location-based search.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    pub fn is_locatable(&self) -> bool {
        self.coordinates().is_some()
    }
}

/// A listing as it comes out of a scrape normalizer. Every field may be
/// missing; enrichment and geocoding fill what they can before
/// [`PartialProperty::into_property`] validates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialProperty {
    pub source: Option<Source>,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub area_usable: Option<f64>,
    pub rooms: Option<u32>,
    pub year_built: Option<i32>,
    pub features: Vec<String>,
    pub partitioning: Option<String>,
    pub comfort: Option<String>,
    pub interior_condition: Option<String>,
    pub furnishing: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("listing has no usable price")]
    MissingPrice,
    #[error("listing has no property type")]
    MissingType,
    #[error("listing has no city")]
    MissingCity,
}

impl PartialProperty {
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Validate the record and turn it into a draft [`Property`].
    pub fn into_property(
        self,
        id: String,
        fingerprint: Option<String>,
    ) -> Result<Property, ValidationError> {
        let price = self
            .price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or(ValidationError::MissingPrice)?;
        let property_type = self.property_type.ok_or(ValidationError::MissingType)?;
        let city = self
            .city
            .filter(|c| !c.trim().is_empty())
            .ok_or(ValidationError::MissingCity)?;

        let title = self.title.unwrap_or_else(|| {
            format!("{} in {}", property_type.label(), city)
        });

        Ok(Property {
            id,
            title,
            description: self.description.unwrap_or_default(),
            price,
            currency: self.currency.unwrap_or_else(|| "EUR".to_string()),
            property_type,
            listing_type: self.listing_type.unwrap_or_default(),
            location: Location {
                county: self.county,
                city,
                area: self.area,
                address: self.address,
                latitude: self.latitude,
                longitude: self.longitude,
            },
            area_usable: self.area_usable,
            rooms: self.rooms.unwrap_or(0),
            year_built: self.year_built,
            features: self.features,
            partitioning: self.partitioning,
            comfort: self.comfort,
            interior_condition: self.interior_condition,
            furnishing: self.furnishing,
            status: ListingStatus::Draft,
            source: self.source,
            source_url: self.source_url,
            fingerprint,
            images: self.images,
            created_at: Utc::now(),
        })
    }
}

impl From<&Property> for PartialProperty {
    fn from(p: &Property) -> Self {
        Self {
            source: p.source,
            source_url: p.source_url.clone(),
            title: Some(p.title.clone()),
            description: Some(p.description.clone()),
            price: Some(p.price),
            currency: Some(p.currency.clone()),
            property_type: Some(p.property_type),
            listing_type: Some(p.listing_type),
            county: p.location.county.clone(),
            city: Some(p.location.city.clone()),
            area: p.location.area.clone(),
            address: p.location.address.clone(),
            latitude: p.location.latitude,
            longitude: p.location.longitude,
            area_usable: p.area_usable,
            rooms: (p.rooms > 0).then_some(p.rooms),
            year_built: p.year_built,
            features: p.features.clone(),
            partitioning: p.partitioning.clone(),
            comfort: p.comfort.clone(),
            interior_condition: p.interior_condition.clone(),
            furnishing: p.furnishing.clone(),
            images: p.images.clone(),
        }
    }
}

/// A reported sale price for a property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoldHistoryRecord {
    pub id: String,
    pub property_id: String,
    pub sold_price: f64,
    pub sold_date: NaiveDate,
    /// User who reported the sale. Lookup only.
    pub reporter: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cached air-quality and solar data for one property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentalMetrics {
    pub property_id: String,
    pub air_quality_index: Option<f64>,
    pub air_quality_category: Option<String>,
    pub solar_potential_score: Option<u8>,
    pub solar_yearly_sunshine_hours: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

/// CSS selectors for one scrape source domain, keyed by field name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScraperConfig {
    pub domain: String,
    pub selectors: BTreeMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImportState {
    Imported,
    Skipped,
    Failed,
}

/// Last import outcome for a source URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportRecord {
    pub url: String,
    pub state: ImportState,
    pub message: Option<String>,
    pub property_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}
