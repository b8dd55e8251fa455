use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Url;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use estate_scout::config::AppConfig;
use estate_scout::contributions::{Actor, ContributionService};
use estate_scout::environment::{
    AirQualitySource, EnvironmentalMetricsCache, GoogleAirQualityClient, GoogleSolarClient,
    SolarPotentialSource, Unavailable,
};
use estate_scout::error::ScrapeError;
use estate_scout::fingerprint::fingerprint;
use estate_scout::geocode::{Geocoder, NominatimClient};
use estate_scout::import::{ImportOutcome, ImportSummary, Importer};
use estate_scout::models::{PartialProperty, ScraperConfig};
use estate_scout::scrapers::{
    GenericScraper, ImmofluxScraper, Normalizer, PageFetcher, Publi24Scraper,
};
use estate_scout::store::{MemoryStore, PropertyStore, ScraperConfigStore};
use estate_scout::valuation::ValuationEstimator;

#[derive(Parser)]
#[command(name = "estate-scout", about = "Import, deduplicate and value property listings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a single listing page
    Import {
        source: SourceArg,
        url: String,
        /// Read the page from disk instead of fetching it
        #[arg(long)]
        html_file: Option<PathBuf>,
        /// Scraper config to use for generic pages; defaults to the URL host
        #[arg(long)]
        domain: Option<String>,
    },
    /// Import every ad linked from a Publi24 results page
    CrawlPubli24 { listing_url: String },
    /// Estimate the market value of a stored property
    Valuate { property_id: String },
    /// Print the duplicate-detection fingerprint of a stored property
    Fingerprint { property_id: String },
    /// Sold-price reports
    Contribution {
        #[command(subcommand)]
        action: ContributionCommand,
    },
    /// Selector maps for the generic scraper
    ScraperConfig {
        #[command(subcommand)]
        action: ScraperConfigCommand,
    },
    /// Last import outcome per URL
    Imports,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Generic,
    Immoflux,
    Publi24,
}

#[derive(Subcommand)]
enum ContributionCommand {
    Submit {
        property_id: String,
        price: f64,
        /// Sale date, YYYY-MM-DD
        date: NaiveDate,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    Verify {
        record_id: String,
        #[arg(long)]
        admin: String,
    },
    Reject {
        record_id: String,
        #[arg(long)]
        admin: String,
    },
    Pending {
        #[arg(long)]
        admin: String,
    },
}

#[derive(Subcommand)]
enum ScraperConfigCommand {
    List,
    /// Replace the selectors for a domain
    Set {
        domain: String,
        /// `field=css selector`, repeatable
        #[arg(long = "selector", value_parser = parse_selector_pair)]
        selectors: Vec<(String, String)>,
    },
    Delete { domain: String },
}

fn parse_selector_pair(raw: &str) -> Result<(String, String), String> {
    let (field, css) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=selector, got '{raw}'"))?;
    Ok((field.trim().to_string(), css.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let store = Arc::new(MemoryStore::load(&config.data_path).await?);
    info!("🏠 Estate Scout - data at {}", config.data_path.display());

    let result = run(cli.command, &config, store.clone()).await;

    store.save(&config.data_path).await?;

    result
}

async fn run(command: Command, config: &AppConfig, store: Arc<MemoryStore>) -> anyhow::Result<()> {
    match command {
        Command::Import {
            source,
            url,
            html_file,
            domain,
        } => {
            let normalizer = normalizer_for(source, &url, domain, store.as_ref()).await?;
            let importer = importer(config, store.clone())?;

            let html = match html_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => match fetcher(config)?.fetch(&url).await {
                    Ok(html) => html,
                    Err(e) => {
                        importer.record_failure(&url, format!("{e:#}")).await;
                        return Err(e);
                    }
                },
            };

            report(&importer.import_html(normalizer.as_ref(), &url, &html).await);
        }
        Command::CrawlPubli24 { listing_url } => {
            let scraper = Publi24Scraper::new()?;
            let fetcher = fetcher(config)?;
            let importer = importer(config, store.clone())?;

            let results_page = fetcher.fetch(&listing_url).await?;
            let links = scraper.listing_links(&results_page, &listing_url);

            let mut summary = ImportSummary::default();
            for link in links {
                let outcome = match fetcher.fetch(&link).await {
                    Ok(html) => importer.import_html(&scraper, &link, &html).await,
                    Err(e) => importer.record_failure(&link, format!("{e:#}")).await,
                };
                summary.count(&outcome);
            }

            info!(
                "✅ Crawl done: {} imported, {} skipped, {} failed",
                summary.imported, summary.skipped, summary.failed
            );
        }
        Command::Valuate { property_id } => {
            let air: Arc<dyn AirQualitySource>;
            let solar: Arc<dyn SolarPotentialSource>;
            match &config.google_api_key {
                Some(key) => {
                    air = Arc::new(GoogleAirQualityClient::new(
                        config.air_quality_url.clone(),
                        key.clone(),
                        config.http_timeout,
                    )?);
                    solar = Arc::new(GoogleSolarClient::new(
                        config.solar_url.clone(),
                        key.clone(),
                        config.http_timeout,
                    )?);
                }
                None => {
                    warn!("GOOGLE_API_KEY not set, valuing without environmental data");
                    air = Arc::new(Unavailable);
                    solar = Arc::new(Unavailable);
                }
            }
            let metrics = EnvironmentalMetricsCache::new(store.clone(), air, solar)
                .with_ttl(config.metrics_ttl);
            let estimator = ValuationEstimator::new(store.clone(), metrics).with_query(config.comparables);

            match estimator.estimate(&property_id).await? {
                Some(valuation) => println!("{}", serde_json::to_string_pretty(&valuation)?),
                None => anyhow::bail!(
                    "Property {} cannot be valued: missing, or without coordinates or usable area",
                    property_id
                ),
            }
        }
        Command::Fingerprint { property_id } => {
            let property = store
                .get_property(&property_id)
                .await?
                .with_context(|| format!("Property {property_id} not found"))?;
            println!("{}", fingerprint(&PartialProperty::from(&property)));
        }
        Command::Contribution { action } => {
            let service = ContributionService::new(store.clone());
            match action {
                ContributionCommand::Submit {
                    property_id,
                    price,
                    date,
                    notes,
                    user,
                } => {
                    let record = service
                        .submit(&Actor::user(user), &property_id, price, date, notes)
                        .await?;
                    info!("📝 Recorded sale {} pending review", record.id);
                }
                ContributionCommand::Verify { record_id, admin } => {
                    service.verify(&Actor::admin(admin), &record_id).await?;
                }
                ContributionCommand::Reject { record_id, admin } => {
                    service.reject(&Actor::admin(admin), &record_id).await?;
                }
                ContributionCommand::Pending { admin } => {
                    for record in service.pending(&Actor::admin(admin)).await? {
                        println!(
                            "{}  {}  {:>10.0}  {}  by {}",
                            record.id,
                            record.property_id,
                            record.sold_price,
                            record.sold_date,
                            record.reporter.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
        }
        Command::ScraperConfig { action } => match action {
            ScraperConfigCommand::List => {
                for config in store.list_configs().await? {
                    println!("{}", config.domain);
                    for (field, css) in &config.selectors {
                        println!("   {field}: {css}");
                    }
                }
            }
            ScraperConfigCommand::Set { domain, selectors } => {
                let config = ScraperConfig {
                    domain,
                    selectors: selectors.into_iter().collect::<BTreeMap<_, _>>(),
                    updated_at: Some(Utc::now()),
                };
                // Reject configs the generic scraper could not compile.
                GenericScraper::new(&config)?;
                info!("Saved {} selectors for {}", config.selectors.len(), config.domain);
                store.upsert_config(config).await?;
            }
            ScraperConfigCommand::Delete { domain } => {
                store.delete_config(&domain).await?;
                info!("Deleted scraper config for {}", domain);
            }
        },
        Command::Imports => {
            for record in store.import_records().await? {
                println!(
                    "{:<9} {}  {}  {}",
                    format!("{:?}", record.state),
                    record.updated_at.format("%Y-%m-%d %H:%M"),
                    record.url,
                    record.property_id.or(record.message).unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn fetcher(config: &AppConfig) -> anyhow::Result<PageFetcher> {
    PageFetcher::new(config.http_timeout, &config.user_agent)
}

fn importer(config: &AppConfig, store: Arc<MemoryStore>) -> anyhow::Result<Importer> {
    let nominatim = NominatimClient::new(
        config.geocoder_url.clone(),
        config.http_timeout,
        &config.user_agent,
    )?;
    let geocoder = Geocoder::new(Arc::new(nominatim), config.geocode_country.clone());
    Ok(Importer::new(store, geocoder))
}

async fn normalizer_for(
    source: SourceArg,
    url: &str,
    domain: Option<String>,
    configs: &dyn ScraperConfigStore,
) -> anyhow::Result<Box<dyn Normalizer>> {
    let normalizer: Box<dyn Normalizer> = match source {
        SourceArg::Immoflux => Box::new(ImmofluxScraper::new()?),
        SourceArg::Publi24 => Box::new(Publi24Scraper::new()?),
        SourceArg::Generic => {
            let domain = match domain {
                Some(domain) => domain,
                None => Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .with_context(|| format!("Cannot tell the domain of {url}; pass --domain"))?,
            };
            let config = configs
                .get_config(&domain)
                .await?
                .ok_or(ScrapeError::UnknownDomain(domain))?;
            Box::new(GenericScraper::new(&config)?)
        }
    };
    Ok(normalizer)
}

fn report(outcome: &ImportOutcome) {
    match outcome {
        ImportOutcome::Imported { property_id } => println!("imported {property_id}"),
        ImportOutcome::Skipped { reason, .. } => println!("skipped: {reason}"),
        ImportOutcome::Failed { message } => println!("failed: {message}"),
    }
}
