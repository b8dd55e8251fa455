//! Air-quality and solar-potential data per property, cached with a TTL.

pub mod google;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::models::{Coordinates, EnvironmentalMetrics};
use crate::store::MetricsStore;

pub use google::{GoogleAirQualityClient, GoogleSolarClient};

pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Sunshine hours treated as a perfect solar score.
pub const SOLAR_REFERENCE_HOURS: f64 = 2000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AirQualityReading {
    pub aqi: f64,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarReading {
    pub max_sunshine_hours_per_year: f64,
}

impl SolarReading {
    /// 0–100 score scaled linearly against [`SOLAR_REFERENCE_HOURS`].
    pub fn score(&self) -> u8 {
        let scaled = (self.max_sunshine_hours_per_year / SOLAR_REFERENCE_HOURS * 100.0).round();
        scaled.clamp(0.0, 100.0) as u8
    }
}

#[async_trait]
pub trait AirQualitySource: Send + Sync {
    /// Current conditions at a point; `None` when the service has no data.
    async fn current_conditions(&self, at: Coordinates) -> Result<Option<AirQualityReading>>;
}

#[async_trait]
pub trait SolarPotentialSource: Send + Sync {
    /// Solar insight for the closest building; `None` when there is none.
    async fn building_insights(&self, at: Coordinates) -> Result<Option<SolarReading>>;
}

/// Read-through cache over a [`MetricsStore`].
pub struct EnvironmentalMetricsCache {
    store: Arc<dyn MetricsStore>,
    air_quality: Arc<dyn AirQualitySource>,
    solar: Arc<dyn SolarPotentialSource>,
    ttl: Duration,
}

impl EnvironmentalMetricsCache {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        air_quality: Arc<dyn AirQualitySource>,
        solar: Arc<dyn SolarPotentialSource>,
    ) -> Self {
        Self {
            store,
            air_quality,
            solar,
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cached metrics while fresh; otherwise a live refresh, falling back to
    /// the stale row when both lookups come back empty.
    pub async fn get_metrics(
        &self,
        property_id: &str,
        lat: f64,
        lng: f64,
    ) -> Option<EnvironmentalMetrics> {
        let cached = match self.store.get(property_id).await {
            Ok(row) => row,
            Err(e) => {
                warn!("Reading cached metrics for {} failed: {}", property_id, e);
                None
            }
        };

        if let Some(row) = &cached {
            if Utc::now() - row.last_updated <= self.ttl {
                debug!("Serving cached environmental metrics for {}", property_id);
                return Some(row.clone());
            }
        }

        match self.fetch(property_id, Coordinates { lat, lng }).await {
            Some(fresh) => {
                if let Err(e) = self.store.put(fresh.clone()).await {
                    warn!("Storing metrics for {} failed: {}", property_id, e);
                }
                Some(fresh)
            }
            None => {
                if cached.is_some() {
                    info!("Metrics refresh for {} returned nothing, keeping stale row", property_id);
                }
                cached
            }
        }
    }

    async fn fetch(&self, property_id: &str, at: Coordinates) -> Option<EnvironmentalMetrics> {
        let (air, solar) = tokio::join!(
            self.air_quality.current_conditions(at),
            self.solar.building_insights(at)
        );

        let air = air.unwrap_or_else(|e| {
            warn!("Air quality lookup for {} failed: {:#}", property_id, e);
            None
        });
        let solar = solar.unwrap_or_else(|e| {
            warn!("Solar lookup for {} failed: {:#}", property_id, e);
            None
        });

        if air.is_none() && solar.is_none() {
            return None;
        }

        Some(EnvironmentalMetrics {
            property_id: property_id.to_string(),
            air_quality_index: air.as_ref().map(|a| a.aqi),
            air_quality_category: air.map(|a| a.category),
            solar_potential_score: solar.map(|s| s.score()),
            solar_yearly_sunshine_hours: solar.map(|s| s.max_sunshine_hours_per_year),
            last_updated: Utc::now(),
        })
    }
}

/// Lookups for deployments without environmental API credentials.
pub struct Unavailable;

#[async_trait]
impl AirQualitySource for Unavailable {
    async fn current_conditions(&self, _at: Coordinates) -> Result<Option<AirQualityReading>> {
        Ok(None)
    }
}

#[async_trait]
impl SolarPotentialSource for Unavailable {
    async fn building_insights(&self, _at: Coordinates) -> Result<Option<SolarReading>> {
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and answers with a fixed result.
    pub(crate) struct FixedAir {
        pub(crate) reading: Option<AirQualityReading>,
        pub(crate) fail: bool,
        pub(crate) calls: AtomicUsize,
    }

    impl FixedAir {
        pub(crate) fn new(aqi: Option<f64>) -> Arc<Self> {
            Arc::new(Self {
                reading: aqi.map(|aqi| AirQualityReading {
                    aqi,
                    category: "Good air quality".to_string(),
                }),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reading: None,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AirQualitySource for FixedAir {
        async fn current_conditions(&self, _at: Coordinates) -> Result<Option<AirQualityReading>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("air quality service down");
            }
            Ok(self.reading.clone())
        }
    }

    pub(crate) struct FixedSolar {
        pub(crate) hours: Option<f64>,
        pub(crate) fail: bool,
    }

    impl FixedSolar {
        pub(crate) fn new(hours: Option<f64>) -> Arc<Self> {
            Arc::new(Self { hours, fail: false })
        }
    }

    #[async_trait]
    impl SolarPotentialSource for FixedSolar {
        async fn building_insights(&self, _at: Coordinates) -> Result<Option<SolarReading>> {
            if self.fail {
                anyhow::bail!("solar service down");
            }
            Ok(self.hours.map(|h| SolarReading {
                max_sunshine_hours_per_year: h,
            }))
        }
    }

    fn row(age_days: i64) -> EnvironmentalMetrics {
        EnvironmentalMetrics {
            property_id: "p".to_string(),
            air_quality_index: Some(70.0),
            air_quality_category: Some("Moderate".to_string()),
            solar_potential_score: Some(50),
            solar_yearly_sunshine_hours: Some(1000.0),
            last_updated: Utc::now() - Duration::days(age_days),
        }
    }

    #[rstest]
    #[case(1000.0, 50)]
    #[case(1700.0, 85)]
    #[case(2500.0, 100)]
    #[case(1234.0, 62)]
    fn solar_score_scales_to_reference(#[case] hours: f64, #[case] expected: u8) {
        let reading = SolarReading {
            max_sunshine_hours_per_year: hours,
        };
        assert_eq!(reading.score(), expected);
    }

    #[tokio::test]
    async fn fresh_row_is_served_without_network() {
        let store = Arc::new(MemoryStore::new());
        store.put(row(29)).await.unwrap();
        let air = FixedAir::new(Some(40.0));
        let cache = EnvironmentalMetricsCache::new(store, air.clone(), FixedSolar::new(Some(1700.0)));

        let metrics = cache.get_metrics("p", 45.75, 21.23).await.unwrap();

        assert_eq!(metrics.air_quality_index, Some(70.0));
        assert_eq!(air.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_row_triggers_refresh() {
        let store = Arc::new(MemoryStore::new());
        store.put(row(31)).await.unwrap();
        let air = FixedAir::new(Some(40.0));
        let cache =
            EnvironmentalMetricsCache::new(store.clone(), air.clone(), FixedSolar::new(Some(1700.0)));

        let metrics = cache.get_metrics("p", 45.75, 21.23).await.unwrap();

        assert_eq!(air.calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.air_quality_index, Some(40.0));
        assert_eq!(metrics.solar_potential_score, Some(85));
        let stored = MetricsStore::get(store.as_ref(), "p").await.unwrap().unwrap();
        assert_eq!(stored, metrics);
    }

    #[tokio::test]
    async fn missing_row_is_fetched_and_partial_data_kept() {
        let store = Arc::new(MemoryStore::new());
        let cache = EnvironmentalMetricsCache::new(
            store.clone(),
            FixedAir::new(Some(120.0)),
            Arc::new(FixedSolar { hours: None, fail: true }),
        );

        let metrics = cache.get_metrics("p", 45.75, 21.23).await.unwrap();

        assert_eq!(metrics.air_quality_index, Some(120.0));
        assert_eq!(metrics.solar_potential_score, None);
        assert!(MetricsStore::get(store.as_ref(), "p").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_stale_row() {
        let store = Arc::new(MemoryStore::new());
        let stale = row(45);
        store.put(stale.clone()).await.unwrap();
        let cache = EnvironmentalMetricsCache::new(
            store,
            FixedAir::failing(),
            Arc::new(FixedSolar { hours: None, fail: true }),
        );

        assert_eq!(cache.get_metrics("p", 45.75, 21.23).await, Some(stale));
    }

    #[tokio::test]
    async fn nothing_anywhere_yields_none() {
        let cache = EnvironmentalMetricsCache::new(
            Arc::new(MemoryStore::new()),
            FixedAir::new(None),
            FixedSolar::new(None),
        );
        assert_eq!(cache.get_metrics("p", 45.75, 21.23).await, None);
    }

    #[tokio::test]
    async fn ttl_is_configurable() {
        let store = Arc::new(MemoryStore::new());
        store.put(row(3)).await.unwrap();
        let air = FixedAir::new(Some(40.0));
        let cache = EnvironmentalMetricsCache::new(store, air.clone(), FixedSolar::new(None))
            .with_ttl(Duration::days(2));

        cache.get_metrics("p", 45.75, 21.23).await.unwrap();
        assert_eq!(air.calls.load(Ordering::SeqCst), 1);
    }
}
