//! Command-line interface definitions for related_news.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Dataset credentials can be provided via command-line flags or environment
//! variables.

use crate::dataset::bigquery::DEFAULT_DATASET;
use crate::pipeline::{DedupPolicy, PreprocessOptions};
use crate::utils::parse_event_date;
use chrono::NaiveDate;
use clap::Parser;
use clap::builder::RangedU64ValueParser;

/// Command-line arguments for one pipeline run.
///
/// # Examples
///
/// ```sh
/// # Identifier-cluster lookup through the events table
/// related_news https://example.com/story --project my-gcp-project
///
/// # Mention-join around a known date, 3 days each side, 4 fetches at a time
/// related_news https://example.com/story -d 2021-05-01 -w 3 -c 4 -o out.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL of the seed article
    pub url: String,

    /// Date of the seed event (YYYY-MM-DD); switches to the mention-join lookup
    #[arg(short = 'd', long, value_parser = parse_event_date)]
    pub event_date: Option<NaiveDate>,

    /// Days on each side of the seed date
    #[arg(short, long, default_value_t = 7)]
    pub window: u32,

    /// Maximum number of articles fetched
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// Maximum article length in characters before truncation
    #[arg(short, long, default_value_t = 10_000)]
    pub max_length: usize,

    /// Number of article fetches in flight at once
    #[arg(short, long, default_value_t = 1, value_parser = RangedU64ValueParser::<usize>::new().range(1..=64))]
    pub concurrency: usize,

    /// Deduplication of the final list [default: content with --event-date, none otherwise]
    #[arg(long, value_enum)]
    pub dedup: Option<DedupPolicy>,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Google Cloud project billed for the dataset queries
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: String,

    /// OAuth2 access token for BigQuery (e.g. `gcloud auth print-access-token`)
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// BigQuery dataset holding the GDELT `events` and `eventmentions` tables
    #[arg(long, default_value = DEFAULT_DATASET)]
    pub dataset: String,
}

impl Cli {
    pub fn options(&self) -> PreprocessOptions {
        PreprocessOptions {
            window_days: self.window,
            limit: self.limit,
            max_length: self.max_length,
            concurrency: self.concurrency,
            dedup: self.dedup,
        }
    }
}
