//! Scraped page → stored listing, with duplicate detection.
//!
//! Each page runs to completion on its own: a failure is recorded against
//! the page URL and the batch moves on. Re-running an import for a failed
//! URL retries it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enrichment::enrich;
use crate::error::{ScrapeError, StoreError};
use crate::fingerprint::fingerprint;
use crate::geocode::Geocoder;
use crate::models::{ImportRecord, ImportState, ValidationError};
use crate::scrapers::Normalizer;
use crate::store::PropertyStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported { property_id: String },
    /// Already in the store; not an error. `property_id` names the stored
    /// listing when the URL itself was imported before.
    Skipped {
        reason: String,
        property_id: Option<String>,
    },
    Failed { message: String },
}

impl ImportOutcome {
    fn state(&self) -> ImportState {
        match self {
            ImportOutcome::Imported { .. } => ImportState::Imported,
            ImportOutcome::Skipped { .. } => ImportState::Skipped,
            ImportOutcome::Failed { .. } => ImportState::Failed,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportSummary {
    pub fn count(&mut self, outcome: &ImportOutcome) {
        match outcome {
            ImportOutcome::Imported { .. } => self.imported += 1,
            ImportOutcome::Skipped { .. } => self.skipped += 1,
            ImportOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Error, Debug)]
enum ImportError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Importer {
    store: Arc<dyn PropertyStore>,
    geocoder: Geocoder,
}

impl Importer {
    pub fn new(store: Arc<dyn PropertyStore>, geocoder: Geocoder) -> Self {
        Self { store, geocoder }
    }

    /// Import one page and record the outcome against its URL.
    pub async fn import_html(&self, normalizer: &dyn Normalizer, url: &str, html: &str) -> ImportOutcome {
        let outcome = match self.run(normalizer, url, html).await {
            Ok(outcome) => outcome,
            Err(e) => ImportOutcome::Failed {
                message: e.to_string(),
            },
        };

        match &outcome {
            ImportOutcome::Imported { property_id } => info!("Imported {} as {}", url, property_id),
            ImportOutcome::Skipped { reason, .. } => info!("Skipped {}: {}", url, reason),
            ImportOutcome::Failed { message } => warn!("Import of {} failed: {}", url, message),
        }
        self.record(url, &outcome).await;
        outcome
    }

    /// Record a page that could not even be fetched.
    pub async fn record_failure(&self, url: &str, message: impl Into<String>) -> ImportOutcome {
        let outcome = ImportOutcome::Failed {
            message: message.into(),
        };
        self.record(url, &outcome).await;
        outcome
    }

    pub async fn import_batch(
        &self,
        normalizer: &dyn Normalizer,
        pages: &[(String, String)],
    ) -> (Vec<ImportOutcome>, ImportSummary) {
        let mut summary = ImportSummary::default();
        let mut outcomes = Vec::with_capacity(pages.len());

        for (url, html) in pages {
            let outcome = self.import_html(normalizer, url, html).await;
            summary.count(&outcome);
            outcomes.push(outcome);
        }

        info!(
            "Batch done: {} imported, {} skipped, {} failed",
            summary.imported, summary.skipped, summary.failed
        );
        (outcomes, summary)
    }

    async fn run(
        &self,
        normalizer: &dyn Normalizer,
        url: &str,
        html: &str,
    ) -> Result<ImportOutcome, ImportError> {
        if let Some(existing) = self.store.find_by_source_url(url).await? {
            return Ok(ImportOutcome::Skipped {
                reason: format!("already imported as {}", existing.id),
                property_id: Some(existing.id),
            });
        }

        debug!("Normalizing {} as a {} page", url, normalizer.source());
        let listing = normalizer.normalize(html, url)?;
        let text = [listing.title.as_deref(), listing.description.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n");
        let mut listing = enrich(&text, listing);

        if !listing.has_coordinates() {
            match self.geocoder.geocode(&listing).await {
                Some(at) => {
                    listing.latitude = Some(at.lat);
                    listing.longitude = Some(at.lng);
                }
                None => warn!("Could not geocode {}; it will be excluded from valuations", url),
            }
        }

        let key = fingerprint(&listing);
        let property = listing.into_property(Uuid::new_v4().to_string(), Some(key))?;
        let property_id = property.id.clone();

        match self.store.insert_if_absent(property).await {
            Ok(()) => Ok(ImportOutcome::Imported { property_id }),
            Err(StoreError::Conflict(reason)) => Ok(ImportOutcome::Skipped {
                reason,
                property_id: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn record(&self, url: &str, outcome: &ImportOutcome) {
        let (message, property_id) = match outcome {
            ImportOutcome::Imported { property_id } => (None, Some(property_id.clone())),
            ImportOutcome::Skipped {
                reason,
                property_id,
            } => (Some(reason.clone()), property_id.clone()),
            ImportOutcome::Failed { message } => (Some(message.clone()), None),
        };
        let record = ImportRecord {
            url: url.to_string(),
            state: outcome.state(),
            message,
            property_id,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.store.record_import(record).await {
            warn!("Could not record import status for {}: {}", url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodingService;
    use crate::models::{Coordinates, PartialProperty, PropertyType, Source};
    use async_trait::async_trait;
    use crate::store::MemoryStore;

    struct FixedGeocoder(Option<Coordinates>);

    #[async_trait]
    impl GeocodingService for FixedGeocoder {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<Coordinates>> {
            Ok(self.0.into_iter().collect())
        }
    }

    /// Treats the page body as `title|price|city`.
    struct PipeNormalizer;

    impl Normalizer for PipeNormalizer {
        fn normalize(&self, html: &str, url: &str) -> Result<PartialProperty, ScrapeError> {
            let mut parts = html.split('|');
            let title = parts.next().filter(|t| !t.is_empty()).ok_or(ScrapeError::MissingField("title"))?;
            Ok(PartialProperty {
                source: Some(Source::Generic),
                source_url: Some(url.to_string()),
                title: Some(title.to_string()),
                price: parts.next().and_then(|p| p.parse().ok()),
                city: parts.next().map(str::to_string),
                ..Default::default()
            })
        }

        fn source(&self) -> Source {
            Source::Generic
        }
    }

    fn importer(store: Arc<MemoryStore>) -> Importer {
        let geocoder = Geocoder::new(
            Arc::new(FixedGeocoder(Some(Coordinates { lat: 45.75, lng: 21.23 }))),
            "Romania",
        );
        Importer::new(store, geocoder)
    }

    #[tokio::test]
    async fn imports_enriched_geocoded_listing() {
        let store = Arc::new(MemoryStore::new());
        let importer = importer(store.clone());

        let outcome = importer
            .import_html(&PipeNormalizer, "https://a/1", "Apartament 2 camere decomandat|90000|Timisoara")
            .await;

        let ImportOutcome::Imported { property_id } = outcome else {
            panic!("expected import, got {outcome:?}");
        };
        let stored = store.get_property(&property_id).await.unwrap().unwrap();
        assert_eq!(stored.property_type, PropertyType::Apartment);
        assert_eq!(stored.rooms, 2);
        assert_eq!(stored.partitioning.as_deref(), Some("Decomandat"));
        assert_eq!(stored.location.latitude, Some(45.75));
        assert_eq!(stored.fingerprint.as_ref().map(String::len), Some(64));

        let log = store.import_records().await.unwrap();
        assert_eq!(log[0].state, ImportState::Imported);
        assert_eq!(log[0].property_id.as_deref(), Some(property_id.as_str()));
    }

    #[tokio::test]
    async fn same_listing_from_another_source_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let importer = importer(store.clone());

        importer
            .import_html(&PipeNormalizer, "https://a/1", "Apartament 2 camere|90000|Timisoara")
            .await;
        let second = importer
            .import_html(&PipeNormalizer, "https://b/77", "Apartament 2 camere|90400|TIMISOARA")
            .await;

        assert!(matches!(second, ImportOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn reimporting_a_url_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let importer = importer(store.clone());
        let page = "Apartament 2 camere|90000|Timisoara";

        let first = importer.import_html(&PipeNormalizer, "https://a/1", page).await;
        let again = importer.import_html(&PipeNormalizer, "https://a/1", page).await;

        let ImportOutcome::Imported { property_id } = first else {
            panic!("expected import, got {first:?}");
        };
        assert!(matches!(again, ImportOutcome::Skipped { ref reason, .. } if reason.starts_with("already imported")));

        let log = store.import_records().await.unwrap();
        let row = log.iter().find(|r| r.url == "https://a/1").unwrap();
        assert_eq!(row.state, ImportState::Skipped);
        assert_eq!(row.property_id.as_deref(), Some(property_id.as_str()));
    }

    #[tokio::test]
    async fn one_bad_page_does_not_stop_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let importer = importer(store.clone());
        let pages = vec![
            ("https://a/1".to_string(), "|".to_string()),
            ("https://a/2".to_string(), "Apartament|0|Arad".to_string()),
            ("https://a/3".to_string(), "Casă 4 camere|150000|Arad".to_string()),
        ];

        let (outcomes, summary) = importer.import_batch(&PipeNormalizer, &pages).await;

        assert_eq!(summary, ImportSummary { imported: 1, skipped: 0, failed: 2 });
        assert_eq!(
            outcomes[1],
            ImportOutcome::Failed {
                message: "listing has no usable price".to_string()
            }
        );
        let failed = store
            .import_records()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.state == ImportState::Failed)
            .count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn ungeocoded_listing_is_still_stored() {
        let store = Arc::new(MemoryStore::new());
        let importer = Importer::new(
            store.clone(),
            Geocoder::new(Arc::new(FixedGeocoder(None)), "Romania"),
        );

        let outcome = importer
            .import_html(&PipeNormalizer, "https://a/1", "Teren intravilan 500 mp|20000|Arad")
            .await;

        let ImportOutcome::Imported { property_id } = outcome else {
            panic!("expected import");
        };
        let stored = store.get_property(&property_id).await.unwrap().unwrap();
        assert!(!stored.is_locatable());
        assert_eq!(stored.property_type, PropertyType::Land);
    }
}
