pub mod fetch;
pub mod generic;
pub mod immoflux;
pub mod parse;
pub mod publi24;
pub mod traits;

pub use fetch::PageFetcher;
pub use generic::GenericScraper;
pub use immoflux::ImmofluxScraper;
pub use parse::{parse_number, parse_price};
pub use publi24::Publi24Scraper;
pub use traits::Normalizer;
