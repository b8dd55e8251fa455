//! Address → coordinates resolution with a coarse-to-fine fallback chain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{Coordinates, PartialProperty};

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Queries shorter than this carry too little signal to geocode.
const MIN_QUERY_LEN: usize = 10;

/// Free-text geocoding backend.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Matches for `query`, best first. An empty list means no match.
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>>;
}

/// Resolves listings to coordinates, never failing.
pub struct Geocoder {
    service: Arc<dyn GeocodingService>,
    country: String,
}

impl Geocoder {
    pub fn new(service: Arc<dyn GeocodingService>, country: impl Into<String>) -> Self {
        Self {
            service,
            country: country.into(),
        }
    }

    /// Try each candidate query once, in order. Service errors count as no
    /// match; `None` means the listing stays ungeocoded.
    pub async fn geocode(&self, listing: &PartialProperty) -> Option<Coordinates> {
        for query in candidate_queries(listing, &self.country) {
            match self.service.search(&query).await {
                Ok(results) => {
                    if let Some(first) = results.into_iter().next() {
                        debug!("Geocoded '{}' to {},{}", query, first.lat, first.lng);
                        return Some(first);
                    }
                    debug!("No geocoding match for '{}'", query);
                }
                Err(e) => warn!("Geocoding '{}' failed: {:#}", query, e),
            }
        }
        None
    }
}

/// Ordered queries: street address, then neighbourhood, then city.
pub fn candidate_queries(listing: &PartialProperty, country: &str) -> Vec<String> {
    let city = listing.city.as_deref();
    let county = listing.county.as_deref();
    let country = Some(country);

    let mut queries: Vec<String> = Vec::new();
    let chains = [
        listing.address.as_deref().map(|a| [Some(a), city, county, country]),
        listing.area.as_deref().map(|a| [Some(a), city, county, country]),
        city.map(|c| [Some(c), county, country, None]),
    ];

    for parts in chains.into_iter().flatten() {
        let query = parts
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        if query.chars().count() >= MIN_QUERY_LEN && !queries.contains(&query) {
            queries.push(query);
        }
    }
    queries
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim search endpoint adapter.
pub struct NominatimClient {
    client: Client,
    endpoint: Url,
}

impl NominatimClient {
    pub fn new(endpoint: Url, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl GeocodingService for NominatimClient {
    async fn search(&self, query: &str) -> Result<Vec<Coordinates>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .context("Failed to reach geocoding service")?;

        if !response.status().is_success() {
            anyhow::bail!("Geocoding service returned {}", response.status());
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .context("Failed to decode geocoding response")?;

        Ok(places
            .into_iter()
            .filter_map(|p| {
                Some(Coordinates {
                    lat: p.lat.parse().ok()?,
                    lng: p.lon.parse().ok()?,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedService {
        answers: Mutex<Vec<Result<Vec<Coordinates>>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedService {
        fn new(answers: Vec<Result<Vec<Coordinates>>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GeocodingService for ScriptedService {
        async fn search(&self, query: &str) -> Result<Vec<Coordinates>> {
            self.seen.lock().unwrap().push(query.to_string());
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Ok(vec![])
            } else {
                answers.remove(0)
            }
        }
    }

    fn listing() -> PartialProperty {
        PartialProperty {
            address: Some("Str. Pacii 10".to_string()),
            area: Some("Fabric".to_string()),
            city: Some("Timisoara".to_string()),
            county: Some("Timis".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn candidates_go_from_fine_to_coarse() {
        assert_eq!(
            candidate_queries(&listing(), "Romania"),
            vec![
                "Str. Pacii 10, Timisoara, Timis, Romania",
                "Fabric, Timisoara, Timis, Romania",
                "Timisoara, Timis, Romania",
            ]
        );
    }

    #[test]
    fn short_candidates_are_dropped() {
        let sparse = PartialProperty {
            city: Some("Arad".to_string()),
            ..Default::default()
        };
        assert!(candidate_queries(&sparse, "RO").is_empty());
        assert_eq!(candidate_queries(&sparse, "Romania"), vec!["Arad, Romania"]);
    }

    #[test]
    fn missing_leading_parts_skip_their_candidate() {
        let no_street = PartialProperty {
            address: None,
            ..listing()
        };
        assert_eq!(candidate_queries(&no_street, "Romania").len(), 2);
    }

    #[tokio::test]
    async fn falls_back_past_errors_and_empty_results() {
        let hit = Coordinates { lat: 45.75, lng: 21.23 };
        let service = ScriptedService::new(vec![
            Err(anyhow::anyhow!("timeout")),
            Ok(vec![]),
            Ok(vec![hit]),
        ]);
        let geocoder = Geocoder::new(service.clone(), "Romania");

        assert_eq!(geocoder.geocode(&listing()).await, Some(hit));
        assert_eq!(service.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_none() {
        let service = ScriptedService::new(vec![]);
        let geocoder = Geocoder::new(service, "Romania");
        assert_eq!(geocoder.geocode(&listing()).await, None);
    }

    #[tokio::test]
    async fn nominatim_parses_string_coordinates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::UrlEncoded(
                "q".into(),
                "Timisoara, Timis, Romania".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"lat":"45.7537","lon":"21.2257","display_name":"Timișoara"}]"#)
            .create_async()
            .await;

        let endpoint = Url::parse(&format!("{}/search", server.url())).unwrap();
        let client = NominatimClient::new(endpoint, Duration::from_secs(5), "test").unwrap();
        let found = client.search("Timisoara, Timis, Romania").await.unwrap();

        mock.assert_async().await;
        assert_eq!(found, vec![Coordinates { lat: 45.7537, lng: 21.2257 }]);
    }

    #[tokio::test]
    async fn nominatim_error_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let endpoint = Url::parse(&format!("{}/search", server.url())).unwrap();
        let client = NominatimClient::new(endpoint, Duration::from_secs(5), "test").unwrap();
        assert!(client.search("Timisoara, Romania").await.is_err());
    }
}
