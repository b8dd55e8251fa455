//! Comparable-sales valuation with an environmental adjustment.

pub mod comparables;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::environment::EnvironmentalMetricsCache;
use crate::error::StoreError;
use crate::models::{EnvironmentalMetrics, Property};
use crate::store::PropertyStore;

pub use comparables::{find_comparables, CapPolicy, Comparable, ComparableQuery};

/// Air quality at or below this index earns a bonus.
const GOOD_AQI: f64 = 50.0;
/// Air quality above this index earns a penalty.
const POOR_AQI: f64 = 100.0;
const AIR_QUALITY_IMPACT_PCT: f64 = 2.0;
/// Solar score strictly above this earns a bonus.
const HIGH_SOLAR_SCORE: u8 = 80;
const SOLAR_IMPACT_PCT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityFactor {
    pub index: Option<f64>,
    pub category: Option<String>,
    /// Percentage points added to the value.
    pub impact_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarFactor {
    pub score: Option<u8>,
    pub yearly_sunshine_hours: Option<f64>,
    pub impact_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalFactors {
    pub air_quality: AirQualityFactor,
    pub solar: SolarFactor,
}

impl EnvironmentalFactors {
    pub fn from_metrics(metrics: Option<&EnvironmentalMetrics>) -> Self {
        let index = metrics.and_then(|m| m.air_quality_index);
        let score = metrics.and_then(|m| m.solar_potential_score);

        let air_impact = match index {
            Some(aqi) if aqi <= GOOD_AQI => AIR_QUALITY_IMPACT_PCT,
            Some(aqi) if aqi > POOR_AQI => -AIR_QUALITY_IMPACT_PCT,
            _ => 0.0,
        };
        let solar_impact = match score {
            Some(s) if s > HIGH_SOLAR_SCORE => SOLAR_IMPACT_PCT,
            _ => 0.0,
        };

        Self {
            air_quality: AirQualityFactor {
                index,
                category: metrics.and_then(|m| m.air_quality_category.clone()),
                impact_pct: air_impact,
            },
            solar: SolarFactor {
                score,
                yearly_sunshine_hours: metrics.and_then(|m| m.solar_yearly_sunshine_hours),
                impact_pct: solar_impact,
            },
        }
    }

    /// Combined impact as a fraction, e.g. `0.03` for +3%.
    pub fn total_impact(&self) -> f64 {
        (self.air_quality.impact_pct + self.solar.impact_pct) / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub estimated_value: i64,
    /// Coarse 0–100 measure of how much comparable evidence backs the value.
    pub confidence_score: u8,
    pub base_value: f64,
    pub price_per_sqm: f64,
    pub comparables_count: usize,
    pub environmental: EnvironmentalFactors,
    pub comparables: Vec<Comparable>,
}

/// Three-tier confidence from the number of usable comparables.
pub fn confidence_for(valid_comparables: usize) -> u8 {
    match valid_comparables {
        0 => 30,
        1 | 2 => 60,
        _ => 90,
    }
}

/// Value a property from its surroundings. Pure; see
/// [`ValuationEstimator::estimate`] for the I/O side.
pub fn compute_valuation(
    property: &Property,
    target_area: f64,
    candidates: Vec<Comparable>,
    metrics: Option<&EnvironmentalMetrics>,
) -> ValuationResult {
    let valid: Vec<Comparable> = candidates
        .into_iter()
        .filter(|c| comparables::is_similar_size(c, target_area))
        .collect();

    let rates: Vec<f64> = valid.iter().filter_map(Comparable::price_per_sqm).collect();
    let (base_value, price_per_sqm) = if rates.is_empty() {
        (property.price, property.price / target_area)
    } else {
        let average = rates.iter().sum::<f64>() / rates.len() as f64;
        (average * target_area, average)
    };

    let environmental = EnvironmentalFactors::from_metrics(metrics);
    let estimated_value = (base_value * (1.0 + environmental.total_impact())).round() as i64;

    ValuationResult {
        estimated_value,
        confidence_score: confidence_for(valid.len()),
        base_value,
        price_per_sqm,
        comparables_count: valid.len(),
        environmental,
        comparables: valid,
    }
}

pub struct ValuationEstimator {
    store: Arc<dyn PropertyStore>,
    metrics: EnvironmentalMetricsCache,
    query: ComparableQuery,
}

impl ValuationEstimator {
    pub fn new(store: Arc<dyn PropertyStore>, metrics: EnvironmentalMetricsCache) -> Self {
        Self {
            store,
            metrics,
            query: ComparableQuery::default(),
        }
    }

    pub fn with_query(mut self, query: ComparableQuery) -> Self {
        self.query = query;
        self
    }

    /// Estimate the value of a stored property.
    ///
    /// `Ok(None)` when the property is missing, has no coordinates or has no
    /// usable area. Environmental lookups degrade to zero impact; only store
    /// failures are errors.
    pub async fn estimate(&self, property_id: &str) -> Result<Option<ValuationResult>, StoreError> {
        let Some(property) = self.store.get_property(property_id).await? else {
            debug!("Valuation refused: property {} not found", property_id);
            return Ok(None);
        };
        let (Some(at), Some(target_area)) = (
            property.coordinates(),
            property.area_usable.filter(|a| *a > 0.0),
        ) else {
            debug!("Valuation refused: property {} is not located or sized", property_id);
            return Ok(None);
        };

        let metrics = self.metrics.get_metrics(&property.id, at.lat, at.lng).await;
        let candidates = find_comparables(self.store.as_ref(), &property, &self.query)
            .await?
            .unwrap_or_default();

        let result = compute_valuation(&property, target_area, candidates, metrics.as_ref());
        info!(
            "Valued {} at {} (confidence {}, {} comparables)",
            property.id, result.estimated_value, result.confidence_score, result.comparables_count
        );
        Ok(Some(result))
    }
}
