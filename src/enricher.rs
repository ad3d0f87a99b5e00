//! Fetch, extract, truncate and language-tag candidate records.
//!
//! The enricher works on the first `limit` records and leaves the rest alone.
//! Each record is isolated: a failed fetch is logged, reported as
//! [`EnrichOutcome::Failed`], and the record keeps `content == None`. Nothing
//! is retried. Pages may be fetched a few at a time, but outcomes always line
//! up with input order.

use crate::error::FetchError;
use crate::language::LanguageDetector;
use crate::models::ArticleRecord;
use crate::scrapers::{PageFetcher, extract_paragraph_text};
use crate::utils::truncate_content;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

/// What happened to one processed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// Content stored. `language` is `None` when the text was empty or
    /// detection failed.
    Enriched { url: String, language: Option<String> },
    /// Nothing stored.
    Failed { url: String, reason: String },
}

impl EnrichOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Enriches records with page content and language.
pub struct Enricher<'a, F, L> {
    fetcher: &'a F,
    detector: &'a L,
    concurrency: usize,
}

impl<'a, F: PageFetcher, L: LanguageDetector> Enricher<'a, F, L> {
    /// `concurrency` is the number of fetches in flight; 0 is treated as 1.
    pub fn new(fetcher: &'a F, detector: &'a L, concurrency: usize) -> Self {
        Self {
            fetcher,
            detector,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich the first `limit` records in place, truncating content to
    /// `max_length` characters.
    ///
    /// # Arguments
    ///
    /// * `records` - Candidates in resolver order; only a prefix is touched
    /// * `limit` - Maximum number of pages fetched
    /// * `max_length` - Characters kept before the ellipsis
    ///
    /// # Returns
    ///
    /// One [`EnrichOutcome`] per processed record, in input order. Records past
    /// `limit` are left as they were and get no outcome.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let enricher = Enricher::new(&HttpFetcher::new()?, &WhatlangDetector, 4);
    /// let outcomes = enricher.enrich(&mut records, 50, 10_000).await;
    /// let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    /// ```
    #[instrument(level = "info", skip_all, fields(records = records.len(), limit = limit, max_length = max_length))]
    pub async fn enrich(
        &self,
        records: &mut [ArticleRecord],
        limit: usize,
        max_length: usize,
    ) -> Vec<EnrichOutcome> {
        let processed = limit.min(records.len());
        let targets = &mut records[..processed];

        let pages: Vec<Result<(String, Option<String>), FetchError>> =
            stream::iter(targets.iter().map(|r| r.source_url.clone()))
                .map(|url| async move { self.process(&url, max_length).await })
                .buffered(self.concurrency)
                .collect()
                .await;

        let outcomes: Vec<EnrichOutcome> = targets
            .iter_mut()
            .zip(pages)
            .map(|(record, page)| match page {
                Ok((content, language)) => {
                    record.content = Some(content);
                    record.language = language.clone();
                    EnrichOutcome::Enriched {
                        url: record.source_url.clone(),
                        language,
                    }
                }
                Err(e) => EnrichOutcome::Failed {
                    url: record.source_url.clone(),
                    reason: e.to_string(),
                },
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(
            processed,
            enriched = processed - failed,
            failed,
            skipped = records.len() - processed,
            "Enrichment finished"
        );
        outcomes
    }

    /// Fetch one page and turn it into `(content, language)`.
    /// Fetch failures are logged here and handed back for the outcome.
    async fn process(&self, url: &str, max_length: usize) -> Result<(String, Option<String>), FetchError> {
        let html = self.fetcher.fetch(url).await.inspect_err(|e| {
            error!(%url, error = %e, "Error scraping article");
        })?;

        let text = truncate_content(extract_paragraph_text(&html), max_length);
        if text.is_empty() {
            debug!(%url, "No paragraph text; skipping language detection");
            return Ok((text, None));
        }

        let language = match self.detector.detect(&text) {
            Ok(code) => Some(code),
            Err(e) => {
                warn!(%url, error = %e, "Language detection failed");
                None
            }
        };
        debug!(%url, chars = text.chars().count(), ?language, "Enriched article");
        Ok((text, language))
    }
}
