//! Reqwest adapters for the Google Air Quality and Solar APIs.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AirQualityReading, AirQualitySource, SolarPotentialSource, SolarReading};
use crate::models::Coordinates;

pub const DEFAULT_AIR_QUALITY_URL: &str = "https://airquality.googleapis.com";
pub const DEFAULT_SOLAR_URL: &str = "https://solar.googleapis.com";

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    #[serde(default)]
    indexes: Vec<AirQualityIndex>,
}

#[derive(Debug, Deserialize)]
struct AirQualityIndex {
    aqi: Option<f64>,
    category: Option<String>,
}

pub struct GoogleAirQualityClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl GoogleAirQualityClient {
    pub fn new(base_url: Url, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl AirQualitySource for GoogleAirQualityClient {
    async fn current_conditions(&self, at: Coordinates) -> Result<Option<AirQualityReading>> {
        let url = self
            .base_url
            .join("v1/currentConditions:lookup")
            .context("Invalid air quality URL")?;

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "location": { "latitude": at.lat, "longitude": at.lng }
            }))
            .send()
            .await
            .context("Failed to reach air quality service")?;

        if !response.status().is_success() {
            anyhow::bail!("Air quality service returned {}", response.status());
        }

        let body: CurrentConditions = response
            .json()
            .await
            .context("Failed to decode air quality response")?;

        let reading = body.indexes.into_iter().find_map(|index| {
            Some(AirQualityReading {
                aqi: index.aqi?,
                category: index.category.unwrap_or_default(),
            })
        });
        debug!("Air quality at {},{}: {:?}", at.lat, at.lng, reading);
        Ok(reading)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildingInsights {
    solar_potential: Option<SolarPotential>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolarPotential {
    max_sunshine_hours_per_year: Option<f64>,
}

pub struct GoogleSolarClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl GoogleSolarClient {
    pub fn new(base_url: Url, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl SolarPotentialSource for GoogleSolarClient {
    async fn building_insights(&self, at: Coordinates) -> Result<Option<SolarReading>> {
        let url = self
            .base_url
            .join("v1/buildingInsights:findClosest")
            .context("Invalid solar URL")?;

        let response = self
            .client
            .get(url)
            .query(&[
                ("location.latitude", at.lat.to_string()),
                ("location.longitude", at.lng.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .context("Failed to reach solar service")?;

        // No building near the point.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Solar service returned {}", response.status());
        }

        let body: BuildingInsights = response
            .json()
            .await
            .context("Failed to decode solar response")?;

        Ok(body
            .solar_potential
            .and_then(|p| p.max_sunshine_hours_per_year)
            .map(|hours| SolarReading {
                max_sunshine_hours_per_year: hours,
            }))
    }
}
