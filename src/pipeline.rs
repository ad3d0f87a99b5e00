//! Resolve → enrich → filter → deduplicate.
//!
//! [`Pipeline::preprocess`] is the single entry point. It never fetches a
//! page when resolution comes back empty, and it only returns records that
//! ended up with non-empty content.

use crate::dataset::EventDataset;
use crate::enricher::{EnrichOutcome, Enricher};
use crate::error::Result;
use crate::language::LanguageDetector;
use crate::models::ArticleRecord;
use crate::resolver::{Resolver, Seed, Strategy};
use crate::scrapers::PageFetcher;
use chrono::NaiveDate;
use clap::ValueEnum;
use itertools::Itertools;
use tracing::{debug, info, instrument};

/// Which records count as duplicates in the final list.
///
/// Whatever the key, the first record seen wins and order is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupPolicy {
    /// Keep every record.
    None,
    /// One record per source URL.
    Url,
    /// One record per distinct content string.
    Content,
}

impl DedupPolicy {
    /// Content for mention-join runs, nothing for identifier-cluster runs.
    pub fn default_for(strategy: &Strategy) -> Self {
        match strategy {
            Strategy::IdentifierCluster => Self::None,
            Strategy::MentionJoin { .. } => Self::Content,
        }
    }

    pub fn apply(self, records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
        match self {
            Self::None => records,
            Self::Url => records.into_iter().unique_by(|r| r.source_url.clone()).collect(),
            Self::Content => records.into_iter().unique_by(|r| r.content.clone()).collect(),
        }
    }
}

/// Tunables for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Days on each side of the seed date.
    pub window_days: u32,
    /// Maximum number of pages fetched.
    pub limit: usize,
    /// Maximum content length in characters before the ellipsis.
    pub max_length: usize,
    /// Fetches in flight at once.
    pub concurrency: usize,
    /// `None` picks [`DedupPolicy::default_for`] the seed's strategy.
    pub dedup: Option<DedupPolicy>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            window_days: 7,
            limit: 50,
            max_length: 10_000,
            concurrency: 1,
            dedup: None,
        }
    }
}

/// The enrichment pipeline over explicit collaborators.
pub struct Pipeline<'a, D, F, L> {
    dataset: &'a D,
    fetcher: &'a F,
    detector: &'a L,
    today: NaiveDate,
}

impl<'a, D, F, L> Pipeline<'a, D, F, L>
where
    D: EventDataset,
    F: PageFetcher,
    L: LanguageDetector,
{
    pub fn new(dataset: &'a D, fetcher: &'a F, detector: &'a L, today: NaiveDate) -> Self {
        Self {
            dataset,
            fetcher,
            detector,
            today,
        }
    }

    /// Related, enriched articles for `seed`.
    ///
    /// Resolves the seed, enriches the first `options.limit` candidates, drops
    /// records without content and applies the dedup policy. Nothing is
    /// fetched when resolution comes back empty.
    ///
    /// # Arguments
    ///
    /// * `seed` - The starting article and how to tie it to its events
    /// * `options` - Window, fetch limit, content length, concurrency and dedup
    ///
    /// # Returns
    ///
    /// The surviving records in candidate order, each with non-empty content
    /// of at most `max_length` characters plus the ellipsis. An unknown seed
    /// yields an empty list.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let pipeline = Pipeline::new(&dataset, &fetcher, &WhatlangDetector, today);
    /// let seed = Seed::new("https://example.com/story").with_event_date(date);
    /// let records = pipeline.preprocess(&seed, &PreprocessOptions::default()).await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Only dataset failures are returned; per-article failures are logged
    /// and their records left out.
    #[instrument(level = "info", skip_all, fields(url = %seed.url))]
    pub async fn preprocess(&self, seed: &Seed, options: &PreprocessOptions) -> Result<Vec<ArticleRecord>> {
        let resolver = Resolver::new(self.dataset, self.today);
        let Some(mut records) = resolver.resolve(seed, options.window_days).await? else {
            return Ok(Vec::new());
        };

        let enricher = Enricher::new(self.fetcher, self.detector, options.concurrency);
        let outcomes = enricher
            .enrich(&mut records, options.limit, options.max_length)
            .await;
        for outcome in &outcomes {
            if let EnrichOutcome::Failed { url, reason } = outcome {
                debug!(%url, %reason, "Excluded from results");
            }
        }
        let languages = outcomes
            .iter()
            .filter_map(|o| match o {
                EnrichOutcome::Enriched { language, .. } => language.as_deref(),
                EnrichOutcome::Failed { .. } => None,
            })
            .counts();

        let with_content: Vec<ArticleRecord> = records.into_iter().filter(ArticleRecord::has_content).collect();
        let policy = options
            .dedup
            .unwrap_or_else(|| DedupPolicy::default_for(&seed.strategy));
        let before = with_content.len();
        let records = policy.apply(with_content);

        info!(
            returned = records.len(),
            duplicates = before - records.len(),
            ?policy,
            ?languages,
            "Preprocessing complete"
        );
        Ok(records)
    }
}
