//! Error types shared across the pipeline.
//!
//! Transport adapters and the CLI use `anyhow`; these enums sit on the
//! seams callers are expected to match on.

use thiserror::Error;

/// Failure reported by a storage port.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Failure turning a page into a listing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    #[error("invalid CSS selector for {field}: {selector}")]
    Selector { field: String, selector: String },
    #[error("page has no {0}")]
    MissingField(&'static str),
    #[error("no scraper config for domain {0}")]
    UnknownDomain(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for environment variable {var}: {reason}")]
    InvalidEnvValue { var: String, reason: String },
}
