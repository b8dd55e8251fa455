//! Storage ports for the pipeline plus the in-memory adapter.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    EnvironmentalMetrics, ImportRecord, Property, PropertyType, ScraperConfig, SoldHistoryRecord,
};

pub use memory::MemoryStore;

/// Latitude/longitude rectangle, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lng: f64, lat_delta: f64, lng_delta: f64) -> Self {
        Self {
            min_lat: lat - lat_delta,
            max_lat: lat + lat_delta,
            min_lng: lng - lng_delta,
            max_lng: lng + lng_delta,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }
}

/// Filter for sold-history lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoldHistoryFilter {
    pub include_unverified: bool,
    /// Maximum number of records, most recent sale first.
    pub limit: Option<usize>,
}

/// Properties, their sale history and the import log.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn get_property(&self, id: &str) -> Result<Option<Property>, StoreError>;

    /// Properties of one type inside a box, excluding `exclude_id`.
    async fn properties_in_box(
        &self,
        bbox: BoundingBox,
        property_type: PropertyType,
        exclude_id: &str,
    ) -> Result<Vec<Property>, StoreError>;

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Property>, StoreError>;

    /// Insert unless a property with the same fingerprint or source URL
    /// exists; the check and the write happen atomically. Returns
    /// [`StoreError::Conflict`] on a duplicate.
    async fn insert_if_absent(&self, property: Property) -> Result<(), StoreError>;

    /// Delete a property and every sold-history record it owns.
    async fn delete_property(&self, id: &str) -> Result<(), StoreError>;

    /// Sale records of the given properties, ordered by sale date, newest
    /// first.
    async fn sold_history_for(
        &self,
        property_ids: &[String],
        filter: SoldHistoryFilter,
    ) -> Result<Vec<SoldHistoryRecord>, StoreError>;

    async fn get_sold_record(&self, id: &str) -> Result<Option<SoldHistoryRecord>, StoreError>;

    async fn insert_sold_record(&self, record: SoldHistoryRecord) -> Result<(), StoreError>;

    async fn mark_sold_record_verified(&self, id: &str) -> Result<(), StoreError>;

    async fn delete_sold_record(&self, id: &str) -> Result<(), StoreError>;

    async fn unverified_sold_records(&self) -> Result<Vec<SoldHistoryRecord>, StoreError>;

    /// Insert or replace the import status of a URL.
    async fn record_import(&self, record: ImportRecord) -> Result<(), StoreError>;

    async fn import_records(&self) -> Result<Vec<ImportRecord>, StoreError>;
}

/// Key-value store for environmental metrics, one row per property.
///
/// Staleness is decided by the caller from `last_updated`.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn get(&self, property_id: &str) -> Result<Option<EnvironmentalMetrics>, StoreError>;

    /// Upsert keyed by property id; the last writer wins.
    async fn put(&self, metrics: EnvironmentalMetrics) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ScraperConfigStore: Send + Sync {
    async fn list_configs(&self) -> Result<Vec<ScraperConfig>, StoreError>;

    async fn get_config(&self, domain: &str) -> Result<Option<ScraperConfig>, StoreError>;

    async fn upsert_config(&self, config: ScraperConfig) -> Result<(), StoreError>;

    async fn delete_config(&self, domain: &str) -> Result<(), StoreError>;
}
