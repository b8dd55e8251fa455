use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::environment::google::{DEFAULT_AIR_QUALITY_URL, DEFAULT_SOLAR_URL};
use crate::environment::DEFAULT_TTL_DAYS;
use crate::error::ConfigError;
use crate::geocode::DEFAULT_GEOCODER_URL;
use crate::scrapers::fetch::DEFAULT_USER_AGENT;
use crate::valuation::{CapPolicy, ComparableQuery};

pub struct AppConfig {
    pub data_path: PathBuf,
    pub geocoder_url: Url,
    pub geocode_country: String,
    /// Environmental lookups are disabled without a key.
    pub google_api_key: Option<String>,
    pub air_quality_url: Url,
    pub solar_url: Url,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub metrics_ttl: chrono::Duration,
    pub comparables: ComparableQuery,
}

impl AppConfig {
    /// Read the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let comparables = ComparableQuery {
            include_unverified: parse_or(&var, "COMPARABLES_INCLUDE_UNVERIFIED", true)?,
            limit: parse_or(&var, "COMPARABLES_LIMIT", ComparableQuery::default().limit)?,
            policy: match var("COMPARABLES_POLICY").as_deref().map(str::trim) {
                None | Some("recency") => CapPolicy::RecencyFirst,
                Some("fit") => CapPolicy::FitFirst,
                Some(other) => return Err(invalid("COMPARABLES_POLICY", format!("expected 'recency' or 'fit', got '{other}'"))),
            },
            ..ComparableQuery::default()
        };

        Ok(Self {
            data_path: var("ESTATE_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("estate-data.json")),
            geocoder_url: url_or(&var, "GEOCODER_URL", DEFAULT_GEOCODER_URL)?,
            geocode_country: var("GEOCODE_COUNTRY").unwrap_or_else(|| "Romania".to_string()),
            google_api_key: var("GOOGLE_API_KEY"),
            air_quality_url: url_or(&var, "AIR_QUALITY_URL", DEFAULT_AIR_QUALITY_URL)?,
            solar_url: url_or(&var, "SOLAR_URL", DEFAULT_SOLAR_URL)?,
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 30)?),
            user_agent: var("HTTP_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            metrics_ttl: chrono::Duration::days(parse_or(&var, "METRICS_TTL_DAYS", DEFAULT_TTL_DAYS)?),
            comparables,
        })
    }
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnvValue {
        var: var.to_string(),
        reason: reason.into(),
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(key, e.to_string())),
        None => Ok(default),
    }
}

fn url_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = var(key).unwrap_or_else(|| default.to_string());
    Url::parse(raw.trim()).map_err(|e| invalid(key, e.to_string()))
}
