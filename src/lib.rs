//! Listing import, deduplication and comparable-sales valuation for
//! residential property.

pub mod config;
pub mod contributions;
pub mod enrichment;
pub mod environment;
pub mod error;
pub mod fingerprint;
pub mod geocode;
pub mod import;
pub mod models;
pub mod scrapers;
pub mod store;
pub mod valuation;
