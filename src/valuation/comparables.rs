//! Nearby sold properties used as price evidence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Property, PropertyType, SoldHistoryRecord};
use crate::store::{BoundingBox, PropertyStore, SoldHistoryFilter};

/// Half-height of the search box in degrees (about 2 km).
pub const LAT_DELTA: f64 = 0.02;
/// Half-width of the search box in degrees. Not corrected for latitude.
pub const LNG_DELTA: f64 = 0.025;
pub const DEFAULT_LIMIT: usize = 10;
/// A comparable must be strictly closer than this fraction to the target's
/// usable area.
pub const MAX_AREA_DEVIATION: f64 = 0.2;
/// Absorbs rounding so a comparable exactly on the band edge stays out.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Whether the record cap is applied before or after the size filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapPolicy {
    /// Take the most recent sales, then drop badly sized ones. Can leave
    /// nothing even when older well-sized sales exist.
    #[default]
    RecencyFirst,
    /// Drop badly sized sales, then take the most recent.
    FitFirst,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparableQuery {
    pub include_unverified: bool,
    pub limit: usize,
    pub policy: CapPolicy,
    pub lat_delta: f64,
    pub lng_delta: f64,
}

impl Default for ComparableQuery {
    fn default() -> Self {
        Self {
            include_unverified: true,
            limit: DEFAULT_LIMIT,
            policy: CapPolicy::RecencyFirst,
            lat_delta: LAT_DELTA,
            lng_delta: LNG_DELTA,
        }
    }
}

/// A sale record joined with the size and type of the property sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparable {
    pub record: SoldHistoryRecord,
    pub area_usable: Option<f64>,
    pub property_type: PropertyType,
}

impl Comparable {
    pub fn price_per_sqm(&self) -> Option<f64> {
        self.area_usable
            .filter(|a| *a > 0.0)
            .map(|a| self.record.sold_price / a)
    }
}

/// Usable area of the comparable is within the allowed deviation.
pub fn is_similar_size(comparable: &Comparable, target_area: f64) -> bool {
    match comparable.area_usable {
        Some(area) if area > 0.0 && target_area > 0.0 => {
            (area - target_area).abs() / target_area < MAX_AREA_DEVIATION - BOUNDARY_EPSILON
        }
        _ => false,
    }
}

/// Sales of same-type properties around `property`, newest first.
///
/// `Ok(None)` when the property has no coordinates or usable area.
pub async fn find_comparables(
    store: &dyn PropertyStore,
    property: &Property,
    query: &ComparableQuery,
) -> Result<Option<Vec<Comparable>>, StoreError> {
    let (Some(at), Some(target_area)) = (property.coordinates(), property.area_usable) else {
        return Ok(None);
    };

    let bbox = BoundingBox::around(at.lat, at.lng, query.lat_delta, query.lng_delta);
    let neighbours = store
        .properties_in_box(bbox, property.property_type, &property.id)
        .await?;
    if neighbours.is_empty() {
        debug!("No {} neighbours around {}", property.property_type, property.id);
        return Ok(Some(Vec::new()));
    }

    let ids: Vec<String> = neighbours.iter().map(|p| p.id.clone()).collect();
    let limit = match query.policy {
        CapPolicy::RecencyFirst => Some(query.limit),
        CapPolicy::FitFirst => None,
    };
    let records = store
        .sold_history_for(
            &ids,
            SoldHistoryFilter {
                include_unverified: query.include_unverified,
                limit,
            },
        )
        .await?;

    let mut comparables: Vec<Comparable> = records
        .into_iter()
        .filter_map(|record| {
            let owner = neighbours.iter().find(|p| p.id == record.property_id)?;
            Some(Comparable {
                area_usable: owner.area_usable,
                property_type: owner.property_type,
                record,
            })
        })
        .collect();

    if query.policy == CapPolicy::FitFirst {
        comparables.retain(|c| is_similar_size(c, target_area));
        comparables.truncate(query.limit);
    }

    debug!(
        "Found {} comparables for {} ({} neighbours)",
        comparables.len(),
        property.id,
        neighbours.len()
    );
    Ok(Some(comparables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::tests::{property, sale};
    use crate::store::MemoryStore;
    use rstest::rstest;

    fn comp(area: Option<f64>) -> Comparable {
        Comparable {
            record: sale("s", "p", 100_000.0, (2024, 1, 1)),
            area_usable: area,
            property_type: PropertyType::Apartment,
        }
    }

    #[rstest]
    #[case(120.0, false)]
    #[case(80.0, false)]
    #[case(119.99, true)]
    #[case(80.01, true)]
    #[case(100.0, true)]
    fn size_band_is_strict_at_twenty_percent(#[case] area: f64, #[case] similar: bool) {
        assert_eq!(is_similar_size(&comp(Some(area)), 100.0), similar);
    }

    #[rstest]
    #[case(65.5, 78.6, false)]
    #[case(65.5, 52.4, false)]
    #[case(65.5, 78.59, true)]
    #[case(65.5, 52.41, true)]
    #[case(47.3, 56.76, false)]
    fn size_band_edge_holds_for_fractional_areas(
        #[case] target: f64,
        #[case] area: f64,
        #[case] similar: bool,
    ) {
        assert_eq!(is_similar_size(&comp(Some(area)), target), similar);
    }

    #[test]
    fn unsized_comparable_is_never_similar() {
        assert!(!is_similar_size(&comp(None), 100.0));
        assert!(!is_similar_size(&comp(Some(0.0)), 100.0));
        assert_eq!(comp(None).price_per_sqm(), None);
    }

    async fn neighbourhood() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_if_absent(property("target", 45.75, 21.23, 60.0)).await.unwrap();
        store.insert_if_absent(property("small", 45.751, 21.231, 30.0)).await.unwrap();
        store.insert_if_absent(property("fit", 45.749, 21.229, 62.0)).await.unwrap();
        store.insert_if_absent(property("distant", 45.90, 21.23, 60.0)).await.unwrap();

        for month in 1..=10 {
            let id = format!("small-{month}");
            store.insert_sold_record(sale(&id, "small", 40_000.0, (2024, month, 1))).await.unwrap();
        }
        store.insert_sold_record(sale("fit-old", "fit", 93_000.0, (2019, 5, 1))).await.unwrap();
        store.insert_sold_record(sale("distant-1", "distant", 1.0, (2024, 12, 1))).await.unwrap();
        store
    }

    #[tokio::test]
    async fn unlocatable_property_is_refused() {
        let store = MemoryStore::new();
        let mut target = property("t", 45.75, 21.23, 60.0);
        target.location.latitude = None;
        assert_eq!(find_comparables(&store, &target, &ComparableQuery::default()).await.unwrap(), None);

        let mut unsized_target = property("t", 45.75, 21.23, 60.0);
        unsized_target.area_usable = None;
        assert_eq!(
            find_comparables(&store, &unsized_target, &ComparableQuery::default()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn recency_first_can_starve_the_size_filter() {
        let store = neighbourhood().await;
        let target = store.get_property("target").await.unwrap().unwrap();

        let comps = find_comparables(&store, &target, &ComparableQuery::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(comps.len(), 10);
        assert!(comps.iter().all(|c| c.record.property_id == "small"));
        assert!(comps.iter().all(|c| !is_similar_size(c, 60.0)));
    }

    #[tokio::test]
    async fn fit_first_reaches_older_matching_sales() {
        let store = neighbourhood().await;
        let target = store.get_property("target").await.unwrap().unwrap();
        let query = ComparableQuery {
            policy: CapPolicy::FitFirst,
            ..Default::default()
        };

        let comps = find_comparables(&store, &target, &query).await.unwrap().unwrap();

        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].record.id, "fit-old");
        assert_eq!(comps[0].area_usable, Some(62.0));
    }

    #[tokio::test]
    async fn unverified_sales_can_be_excluded() {
        let store = neighbourhood().await;
        store.mark_sold_record_verified("fit-old").await.unwrap();
        let target = store.get_property("target").await.unwrap().unwrap();
        let query = ComparableQuery {
            include_unverified: false,
            ..Default::default()
        };

        let comps = find_comparables(&store, &target, &query).await.unwrap().unwrap();

        assert_eq!(comps.len(), 1);
        assert!(comps[0].record.is_verified);
    }
}
