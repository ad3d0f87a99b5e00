//! # related_news
//!
//! Given the URL of a news article, find other articles that reported on the
//! same event according to GDELT, fetch them, and tag each with its language.
//!
//! ## Usage
//!
//! ```sh
//! related_news https://example.com/story --project my-project > related.json
//! ```
//!
//! ## Architecture
//!
//! One run is a single pass through three stages:
//! 1. **Resolving**: map the seed URL to its GDELT event ids and collect the
//!    other articles tied to those events within a date window
//! 2. **Enriching**: fetch up to `--limit` of those pages, keep their
//!    paragraph text (truncated to `--max-length`) and detect the language
//! 3. **Filtering**: drop records without content, deduplicate, print JSON
//!
//! A page that fails to load is logged and left out; only dataset failures
//! abort the run.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod dataset;
mod enricher;
mod error;
mod language;
mod models;
mod outputs;
mod pipeline;
mod resolver;
mod scrapers;
mod utils;

use cli::Cli;
use dataset::bigquery::{BigQueryClient, BigQueryConfig};
use language::WhatlangDetector;
use outputs::json;
use pipeline::Pipeline;
use resolver::Seed;
use scrapers::HttpFetcher;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("related_news starting up");

    let args = Cli::parse();
    debug!(url = %args.url, event_date = ?args.event_date, dataset = %args.dataset, "Parsed CLI arguments");

    if let Some(path) = args.output.as_deref() {
        if let Err(e) = ensure_writable_parent(path).await {
            error!(%path, error = %e, "Output path is not writable");
            return Err(e);
        }
    }

    let mut seed = Seed::new(args.url.as_str());
    if let Some(date) = args.event_date {
        seed = seed.with_event_date(date);
    }
    let options = args.options();

    let fetcher = HttpFetcher::new()?;
    let detector = WhatlangDetector;
    let today = Local::now().date_naive();

    // The dataset client lives for this run's queries only.
    let result = {
        let mut config = BigQueryConfig::new(args.project.clone(), args.access_token.clone());
        config.dataset = args.dataset.clone();
        let dataset = BigQueryClient::connect(config)?;
        let pipeline = Pipeline::new(&dataset, &fetcher, &detector, today);
        pipeline.preprocess(&seed, &options).await
    };
    let records = match result {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Preprocessing failed");
            return Err(e.into());
        }
    };

    json::write_records(&records, args.output.as_deref()).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        articles = records.len(),
        strategy = ?seed.strategy,
        "Execution complete"
    );
    Ok(())
}
