use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{BoundingBox, MetricsStore, PropertyStore, ScraperConfigStore, SoldHistoryFilter};
use crate::error::StoreError;
use crate::models::{
    EnvironmentalMetrics, ImportRecord, Property, PropertyType, ScraperConfig, SoldHistoryRecord,
};

/// Everything the in-memory store holds, in the shape written to disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub sold_history: BTreeMap<String, SoldHistoryRecord>,
    #[serde(default)]
    pub environmental_metrics: BTreeMap<String, EnvironmentalMetrics>,
    #[serde(default)]
    pub scraper_configs: BTreeMap<String, ScraperConfig>,
    #[serde(default)]
    pub imports: BTreeMap<String, ImportRecord>,
}

/// Store adapter backed by a lock-guarded [`Snapshot`].
///
/// Each operation runs under a single lock acquisition, which gives the
/// per-statement atomicity a relational store would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a JSON snapshot, starting empty when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("No data file at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        debug!(
            "Loaded {} properties and {} sale records",
            snapshot.properties.len(),
            snapshot.sold_history.len()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state).context("Failed to serialize store")?
        };
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("💾 Saved data to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl PropertyStore for MemoryStore {
    async fn get_property(&self, id: &str) -> Result<Option<Property>, StoreError> {
        Ok(self.state.read().await.properties.get(id).cloned())
    }

    async fn properties_in_box(
        &self,
        bbox: BoundingBox,
        property_type: PropertyType,
        exclude_id: &str,
    ) -> Result<Vec<Property>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .properties
            .values()
            .filter(|p| p.id != exclude_id && p.property_type == property_type)
            .filter(|p| {
                p.coordinates()
                    .is_some_and(|c| bbox.contains(c.lat, c.lng))
            })
            .cloned()
            .collect())
    }

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Property>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .properties
            .values()
            .find(|p| p.source_url.as_deref() == Some(url))
            .cloned())
    }

    async fn insert_if_absent(&self, property: Property) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if state.properties.contains_key(&property.id) {
            return Err(StoreError::Conflict(format!("property id {}", property.id)));
        }
        if let Some(existing) = state.properties.values().find(|p| {
            property.fingerprint.is_some() && p.fingerprint == property.fingerprint
        }) {
            return Err(StoreError::Conflict(format!(
                "fingerprint already imported as {}",
                existing.id
            )));
        }
        if let Some(existing) = state.properties.values().find(|p| {
            property.source_url.is_some() && p.source_url == property.source_url
        }) {
            return Err(StoreError::Conflict(format!(
                "source URL already imported as {}",
                existing.id
            )));
        }

        state.properties.insert(property.id.clone(), property);
        Ok(())
    }

    async fn delete_property(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.properties.remove(id).is_none() {
            return Err(StoreError::NotFound(format!("property {id}")));
        }
        state.sold_history.retain(|_, r| r.property_id != id);
        state.environmental_metrics.remove(id);
        Ok(())
    }

    async fn sold_history_for(
        &self,
        property_ids: &[String],
        filter: SoldHistoryFilter,
    ) -> Result<Vec<SoldHistoryRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<SoldHistoryRecord> = state
            .sold_history
            .values()
            .filter(|r| property_ids.contains(&r.property_id))
            .filter(|r| filter.include_unverified || r.is_verified)
            .cloned()
            .collect();

        records.sort_by(|a, b| b.sold_date.cmp(&a.sold_date));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn get_sold_record(&self, id: &str) -> Result<Option<SoldHistoryRecord>, StoreError> {
        Ok(self.state.read().await.sold_history.get(id).cloned())
    }

    async fn insert_sold_record(&self, record: SoldHistoryRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.properties.contains_key(&record.property_id) {
            return Err(StoreError::NotFound(format!("property {}", record.property_id)));
        }
        if state.sold_history.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("sale record {}", record.id)));
        }
        state.sold_history.insert(record.id.clone(), record);
        Ok(())
    }

    async fn mark_sold_record_verified(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .sold_history
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("sale record {id}")))?;
        record.is_verified = true;
        Ok(())
    }

    async fn delete_sold_record(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .sold_history
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("sale record {id}")))
    }

    async fn unverified_sold_records(&self) -> Result<Vec<SoldHistoryRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<SoldHistoryRecord> = state
            .sold_history
            .values()
            .filter(|r| !r.is_verified)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn record_import(&self, record: ImportRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.imports.insert(record.url.clone(), record);
        Ok(())
    }

    async fn import_records(&self) -> Result<Vec<ImportRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<ImportRecord> = state.imports.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn get(&self, property_id: &str) -> Result<Option<EnvironmentalMetrics>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .environmental_metrics
            .get(property_id)
            .cloned())
    }

    async fn put(&self, metrics: EnvironmentalMetrics) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .environmental_metrics
            .insert(metrics.property_id.clone(), metrics);
        Ok(())
    }
}

#[async_trait]
impl ScraperConfigStore for MemoryStore {
    async fn list_configs(&self) -> Result<Vec<ScraperConfig>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .scraper_configs
            .values()
            .cloned()
            .collect())
    }

    async fn get_config(&self, domain: &str) -> Result<Option<ScraperConfig>, StoreError> {
        Ok(self.state.read().await.scraper_configs.get(domain).cloned())
    }

    async fn upsert_config(&self, config: ScraperConfig) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.scraper_configs.insert(config.domain.clone(), config);
        Ok(())
    }

    async fn delete_config(&self, domain: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .scraper_configs
            .remove(domain)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("scraper config {domain}")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ListingStatus, ListingType, Location};
    use chrono::{NaiveDate, Utc};

    pub(crate) fn property(id: &str, lat: f64, lng: f64, area: f64) -> Property {
        Property {
            id: id.to_string(),
            title: format!("Apartament {id}"),
            description: String::new(),
            price: 90_000.0,
            currency: "EUR".to_string(),
            property_type: PropertyType::Apartment,
            listing_type: ListingType::ForSale,
            location: Location {
                county: Some("Timis".to_string()),
                city: "Timisoara".to_string(),
                area: None,
                address: None,
                latitude: Some(lat),
                longitude: Some(lng),
            },
            area_usable: Some(area),
            rooms: 2,
            year_built: None,
            features: vec![],
            partitioning: None,
            comfort: None,
            interior_condition: None,
            furnishing: None,
            status: ListingStatus::Active,
            source: None,
            source_url: None,
            fingerprint: None,
            images: vec![],
            created_at: Utc::now(),
        }
    }

    pub(crate) fn sale(id: &str, property_id: &str, price: f64, date: (i32, u32, u32)) -> SoldHistoryRecord {
        SoldHistoryRecord {
            id: id.to_string(),
            property_id: property_id.to_string(),
            sold_price: price,
            sold_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid date"),
            reporter: None,
            is_verified: false,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_if_absent_rejects_duplicate_fingerprint() {
        let store = MemoryStore::new();
        let mut first = property("a", 45.75, 21.23, 60.0);
        first.fingerprint = Some("fp".to_string());
        let mut second = property("b", 45.75, 21.23, 60.0);
        second.fingerprint = Some("fp".to_string());

        store.insert_if_absent(first).await.expect("first insert");
        let err = store.insert_if_absent(second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn insert_if_absent_rejects_duplicate_source_url() {
        let store = MemoryStore::new();
        let mut first = property("a", 45.75, 21.23, 60.0);
        first.source_url = Some("https://x/1".to_string());
        let mut second = property("b", 45.0, 21.0, 60.0);
        second.source_url = Some("https://x/1".to_string());

        store.insert_if_absent(first).await.expect("first insert");
        assert!(matches!(
            store.insert_if_absent(second).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn box_query_filters_type_and_target() {
        let store = MemoryStore::new();
        store.insert_if_absent(property("target", 45.75, 21.23, 60.0)).await.unwrap();
        store.insert_if_absent(property("near", 45.76, 21.24, 60.0)).await.unwrap();
        store.insert_if_absent(property("far", 46.5, 21.23, 60.0)).await.unwrap();
        let mut house = property("house", 45.75, 21.23, 60.0);
        house.property_type = PropertyType::House;
        store.insert_if_absent(house).await.unwrap();

        let bbox = BoundingBox::around(45.75, 21.23, 0.02, 0.025);
        let found = store
            .properties_in_box(bbox, PropertyType::Apartment, "target")
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
    }

    #[tokio::test]
    async fn sold_history_orders_filters_and_caps() {
        let store = MemoryStore::new();
        store.insert_if_absent(property("p", 45.75, 21.23, 60.0)).await.unwrap();
        store.insert_sold_record(sale("old", "p", 1.0, (2020, 1, 1))).await.unwrap();
        store.insert_sold_record(sale("new", "p", 1.0, (2024, 1, 1))).await.unwrap();
        let mut verified = sale("mid", "p", 1.0, (2022, 1, 1));
        verified.is_verified = true;
        store.insert_sold_record(verified).await.unwrap();

        let ids = vec!["p".to_string()];
        let all = store
            .sold_history_for(&ids, SoldHistoryFilter { include_unverified: true, limit: Some(2) })
            .await
            .unwrap();
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["new", "mid"]);

        let verified_only = store
            .sold_history_for(&ids, SoldHistoryFilter { include_unverified: false, limit: None })
            .await
            .unwrap();
        assert_eq!(verified_only.len(), 1);
        assert_eq!(verified_only[0].id, "mid");
    }

    #[tokio::test]
    async fn deleting_property_cascades_to_sales() {
        let store = MemoryStore::new();
        store.insert_if_absent(property("p", 45.75, 21.23, 60.0)).await.unwrap();
        store.insert_sold_record(sale("s", "p", 1.0, (2024, 1, 1))).await.unwrap();

        store.delete_property("p").await.unwrap();
        assert_eq!(store.get_sold_record("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let store = MemoryStore::new();
        store.insert_if_absent(property("p", 45.75, 21.23, 60.0)).await.unwrap();
        store.save(&path).await.unwrap();

        let loaded = MemoryStore::load(&path).await.unwrap();
        assert!(loaded.get_property("p").await.unwrap().is_some());

        let missing = MemoryStore::load(&dir.path().join("none.json")).await.unwrap();
        assert!(missing.get_property("p").await.unwrap().is_none());
    }
}
