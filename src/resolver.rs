//! Seed URL → candidate related articles.
//!
//! Both strategies answer the same question: which articles reported on the
//! same underlying event as the seed, within a time radius of it. They differ
//! in what the dataset indexes directly.
//!
//! - [`Strategy::IdentifierCluster`]: the events table maps event → source
//!   URL, so the seed's event ids are looked up by URL and the cluster date
//!   is taken from the first match.
//! - [`Strategy::MentionJoin`]: only the mentions table is usable and the
//!   caller already knows the seed's date; the join happens over all mentions
//!   in the window.
//!
//! A seed that matches nothing resolves to `Ok(None)`. Only dataset failures
//! are errors.

use crate::dataset::EventDataset;
use crate::error::DatasetError;
use crate::models::{ArticleRecord, MentionRow};
use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Maximum number of events looked up for the seed URL.
pub const SEED_LOOKUP_LIMIT: usize = 10;

/// Inclusive date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The window of `window_days` on each side of `date`, with the end
    /// clamped to `today`.
    pub fn around(date: NaiveDate, window_days: u32, today: NaiveDate) -> Self {
        let radius = Duration::days(i64::from(window_days));
        let start = date.checked_sub_signed(radius).unwrap_or(NaiveDate::MIN);
        let end = date.checked_add_signed(radius).unwrap_or(NaiveDate::MAX).min(today);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// How the seed is tied to its event cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Look up event ids by source URL in the events table.
    IdentifierCluster,
    /// Join through the mentions table around a known event date.
    MentionJoin { event_date: NaiveDate },
}

/// The article a run starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub url: String,
    pub strategy: Strategy,
}

impl Seed {
    /// A seed resolved through the events table.
    ///
    /// The seed is matched verbatim against the dataset. GDELT identifiers
    /// are not always web URLs, so anything else is only logged; a seed that
    /// matches nothing simply resolves to no records.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        match url::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => warn!(%url, scheme = parsed.scheme(), "Seed is not an http(s) URL"),
            Err(e) => warn!(%url, error = %e, "Seed is not an absolute URL"),
        }
        Self {
            url,
            strategy: Strategy::IdentifierCluster,
        }
    }

    /// Switch to the mention-join strategy around `event_date`.
    pub fn with_event_date(mut self, event_date: NaiveDate) -> Self {
        self.strategy = Strategy::MentionJoin { event_date };
        self
    }
}

/// Resolves seeds against an [`EventDataset`].
pub struct Resolver<'a, D> {
    dataset: &'a D,
    today: NaiveDate,
}

impl<'a, D: EventDataset> Resolver<'a, D> {
    /// `today` clamps the end of every window; the dataset holds no future rows.
    pub fn new(dataset: &'a D, today: NaiveDate) -> Self {
        Self { dataset, today }
    }

    /// Candidate records for `seed`, or `None` when the seed is unknown or
    /// nothing related falls inside the window.
    ///
    /// # Arguments
    ///
    /// * `seed` - The seed identifier and its strategy
    /// * `window_days` - Days on each side of the seed date
    ///
    /// # Returns
    ///
    /// Records with `content` and `language` unset, every date inside
    /// `[seed_date - window_days, min(seed_date + window_days, today)]`.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let resolver = Resolver::new(&dataset, today);
    /// match resolver.resolve(&Seed::new(url), 7).await? {
    ///     Some(records) => println!("{} candidates", records.len()),
    ///     None => println!("seed not in GDELT"),
    /// }
    /// ```
    #[instrument(level = "info", skip_all, fields(url = %seed.url, window_days = window_days))]
    pub async fn resolve(
        &self,
        seed: &Seed,
        window_days: u32,
    ) -> Result<Option<Vec<ArticleRecord>>, DatasetError> {
        let records = match seed.strategy {
            Strategy::IdentifierCluster => self.resolve_cluster(&seed.url, window_days).await?,
            Strategy::MentionJoin { event_date } => {
                let window = DateWindow::around(event_date, window_days, self.today);
                let mentions = self.dataset.mentions_in_window(&window).await?;
                debug!(count = mentions.len(), %window, "Fetched mentions in window");
                join_mentions(&seed.url, &window, mentions)
            }
        };

        match &records {
            Some(r) => info!(candidates = r.len(), "Resolved related articles"),
            None => info!("No related articles found"),
        }
        Ok(records)
    }

    async fn resolve_cluster(
        &self,
        url: &str,
        window_days: u32,
    ) -> Result<Option<Vec<ArticleRecord>>, DatasetError> {
        let seed_events = self.dataset.events_for_url(url, SEED_LOOKUP_LIMIT).await?;
        let Some(first) = seed_events.first() else {
            return Ok(None);
        };

        let event_ids: Vec<u64> = seed_events.iter().map(|e| e.event_id).unique().collect();
        let window = DateWindow::around(first.date, window_days, self.today);
        debug!(ids = ?event_ids, %window, "Seed events found");

        let records: Vec<ArticleRecord> = self
            .dataset
            .events_in_window(&event_ids, &window)
            .await?
            .into_iter()
            .filter(|row| window.contains(row.date) && event_ids.contains(&row.event_id))
            .filter_map(ArticleRecord::from_event_row)
            .collect();

        Ok((!records.is_empty()).then_some(records))
    }
}

/// Mention-join resolution over every mention in `window`.
///
/// Finds the events the seed URL mentions, keeps every mention of those
/// events, and collapses them to one record per URL. The first mention of a
/// URL fixes its date and position; `event_ids` gathers every matching event
/// the URL mentions.
pub fn join_mentions(
    seed_url: &str,
    window: &DateWindow,
    mentions: Vec<MentionRow>,
) -> Option<Vec<ArticleRecord>> {
    let mentions: Vec<MentionRow> = mentions.into_iter().filter(|m| window.contains(m.date)).collect();

    let seed_events: Vec<u64> = mentions
        .iter()
        .filter(|m| m.mention_identifier == seed_url)
        .map(|m| m.event_id)
        .unique()
        .collect();
    if seed_events.is_empty() {
        return None;
    }

    let mut records: Vec<ArticleRecord> = Vec::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    for mention in mentions.into_iter().filter(|m| seed_events.contains(&m.event_id)) {
        match by_url.get(&mention.mention_identifier) {
            Some(&idx) => {
                let ids = &mut records[idx].event_ids;
                if !ids.contains(&mention.event_id) {
                    ids.push(mention.event_id);
                }
            }
            None => {
                by_url.insert(mention.mention_identifier.clone(), records.len());
                records.push(ArticleRecord::new(
                    vec![mention.event_id],
                    mention.date,
                    mention.mention_identifier,
                ));
            }
        }
    }

    Some(records)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{EventMetadata, EventRow};
    use std::sync::Mutex;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn event(id: u64, day: NaiveDate, url: &str) -> EventRow {
        EventRow {
            event_id: id,
            date: day,
            source_url: Some(url.to_string()),
            metadata: EventMetadata::default(),
        }
    }

    pub(crate) fn mention(id: u64, day: NaiveDate, url: &str) -> MentionRow {
        MentionRow {
            event_id: id,
            mention_identifier: url.to_string(),
            date: day,
        }
    }

    /// In-memory dataset. It deliberately ignores the window when returning
    /// events so the resolver's own date filter is exercised.
    #[derive(Default)]
    pub(crate) struct FakeDataset {
        pub events: Vec<EventRow>,
        pub mentions: Vec<MentionRow>,
        pub fail: bool,
        pub windows: Mutex<Vec<DateWindow>>,
    }

    impl EventDataset for FakeDataset {
        async fn events_for_url(&self, url: &str, limit: usize) -> Result<Vec<EventRow>, DatasetError> {
            if self.fail {
                return Err(DatasetError::Api { status: 403, message: "quota exceeded".into() });
            }
            Ok(self
                .events
                .iter()
                .filter(|e| e.source_url.as_deref() == Some(url))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn events_in_window(
            &self,
            event_ids: &[u64],
            window: &DateWindow,
        ) -> Result<Vec<EventRow>, DatasetError> {
            self.windows.lock().unwrap().push(*window);
            Ok(self
                .events
                .iter()
                .filter(|e| event_ids.contains(&e.event_id))
                .cloned()
                .collect())
        }

        async fn mentions_in_window(&self, window: &DateWindow) -> Result<Vec<MentionRow>, DatasetError> {
            if self.fail {
                return Err(DatasetError::Api { status: 500, message: "backend error".into() });
            }
            self.windows.lock().unwrap().push(*window);
            Ok(self.mentions.iter().filter(|m| window.contains(m.date)).cloned().collect())
        }
    }

    const SEED: &str = "https://news.example.com/seed";

    #[test]
    fn test_window_is_symmetric() {
        let w = DateWindow::around(date(2021, 5, 1), 7, date(2026, 1, 1));
        assert_eq!(w.start, date(2021, 4, 24));
        assert_eq!(w.end, date(2021, 5, 8));
        assert!(w.contains(date(2021, 4, 24)));
        assert!(w.contains(date(2021, 5, 8)));
        assert!(!w.contains(date(2021, 5, 9)));
    }

    #[test]
    fn test_window_end_clamped_to_today() {
        let w = DateWindow::around(date(2026, 10, 15), 7, date(2026, 10, 18));
        assert_eq!(w.start, date(2026, 10, 8));
        assert_eq!(w.end, date(2026, 10, 18));
    }

    #[test]
    fn test_window_display() {
        let w = DateWindow::around(date(2021, 5, 1), 1, date(2026, 1, 1));
        assert_eq!(w.to_string(), "2021-04-30..=2021-05-02");
    }

    #[test]
    fn test_seed_keeps_identifier_verbatim() {
        for raw in [SEED, "example.com/story", "BBC Monitoring 20210501-123", "ftp://example.com/a"] {
            let seed = Seed::new(raw);
            assert_eq!(seed.url, raw);
            assert_eq!(seed.strategy, Strategy::IdentifierCluster);
        }

        let seed = Seed::new(SEED).with_event_date(date(2021, 5, 1));
        assert_eq!(seed.strategy, Strategy::MentionJoin { event_date: date(2021, 5, 1) });
    }

    #[tokio::test]
    async fn test_non_url_identifier_resolves_through_mentions() {
        let d = date(2021, 5, 1);
        let ident = "BBC Monitoring 20210501-123";
        let dataset = FakeDataset {
            mentions: vec![mention(10, d, ident), mention(10, d, "https://a.example.com/")],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let records = resolver
            .resolve(&Seed::new(ident).with_event_date(d), 7)
            .await
            .unwrap()
            .unwrap();
        let urls: Vec<&str> = records.iter().map(|r| r.source_url.as_str()).collect();
        assert_eq!(urls, vec![ident, "https://a.example.com/"]);
    }

    #[tokio::test]
    async fn test_non_url_seed_unknown_resolves_to_none() {
        let dataset = FakeDataset {
            events: vec![event(1, date(2021, 5, 1), SEED)],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        assert_eq!(resolver.resolve(&Seed::new("example.com/story"), 7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cluster_unknown_url_resolves_to_none() {
        let dataset = FakeDataset {
            events: vec![event(1, date(2021, 5, 1), "https://other.example.com/")],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let seed = Seed::new(SEED);
        assert_eq!(resolver.resolve(&seed, 7).await.unwrap(), None);
        assert!(dataset.windows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cluster_filters_to_window() {
        let dataset = FakeDataset {
            events: vec![
                event(1, date(2021, 5, 1), SEED),
                event(1, date(2021, 4, 28), "https://a.example.com/1"),
                event(1, date(2021, 5, 3), "https://b.example.com/2"),
                event(1, date(2021, 5, 10), "https://c.example.com/3"),
            ],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let seed = Seed::new(SEED);

        let records = resolver.resolve(&seed, 7).await.unwrap().unwrap();
        let urls: Vec<&str> = records.iter().map(|r| r.source_url.as_str()).collect();
        assert_eq!(urls, vec![SEED, "https://a.example.com/1", "https://b.example.com/2"]);
        assert!(records.iter().all(|r| r.content.is_none() && r.language.is_none()));
        assert!(records.iter().all(|r| r.metadata.is_some()));

        let windows = dataset.windows.lock().unwrap();
        assert_eq!(windows[0], DateWindow { start: date(2021, 4, 24), end: date(2021, 5, 8) });
    }

    #[tokio::test]
    async fn test_cluster_uses_unique_ids_and_first_date() {
        let dataset = FakeDataset {
            events: vec![
                event(1, date(2021, 5, 1), SEED),
                event(2, date(2021, 5, 2), SEED),
                event(1, date(2021, 5, 1), SEED),
                event(2, date(2021, 5, 6), "https://x.example.com/"),
                event(3, date(2021, 5, 2), "https://unrelated.example.com/"),
            ],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let records = resolver.resolve(&Seed::new(SEED), 1).await.unwrap().unwrap();

        // window is 2021-04-30..=2021-05-02, taken from the first seed row
        assert!(records.iter().all(|r| r.event_ids != vec![3]));
        assert!(!records.iter().any(|r| r.source_url == "https://x.example.com/"));
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_dataset_failure_propagates() {
        let dataset = FakeDataset { fail: true, ..Default::default() };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let err = resolver.resolve(&Seed::new(SEED), 7).await.unwrap_err();
        assert!(matches!(err, DatasetError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_mention_join_resolves_siblings() {
        let d = date(2021, 5, 1);
        let dataset = FakeDataset {
            mentions: vec![
                mention(10, date(2021, 4, 30), "https://a.example.com/"),
                mention(10, d, SEED),
                mention(11, d, SEED),
                mention(11, date(2021, 5, 2), "https://b.example.com/"),
                mention(11, date(2021, 5, 3), "https://a.example.com/"),
                mention(12, d, "https://unrelated.example.com/"),
                mention(10, date(2021, 5, 20), "https://late.example.com/"),
            ],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let seed = Seed::new(SEED).with_event_date(d);
        let records = resolver.resolve(&seed, 7).await.unwrap().unwrap();

        let urls: Vec<&str> = records.iter().map(|r| r.source_url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example.com/", SEED, "https://b.example.com/"]);
        assert_eq!(records[0].event_ids, vec![10, 11]);
        assert_eq!(records[0].event_date, date(2021, 4, 30));
        assert_eq!(records[1].event_ids, vec![10, 11]);
        assert!(records.iter().all(|r| r.metadata.is_none() && r.content.is_none()));
    }

    #[tokio::test]
    async fn test_mention_join_unknown_url_resolves_to_none() {
        let d = date(2021, 5, 1);
        let dataset = FakeDataset {
            mentions: vec![mention(10, d, "https://a.example.com/")],
            ..Default::default()
        };
        let resolver = Resolver::new(&dataset, date(2026, 10, 18));
        let seed = Seed::new(SEED).with_event_date(d);
        assert_eq!(resolver.resolve(&seed, 7).await.unwrap(), None);
    }

    #[test]
    fn test_join_mentions_drops_rows_outside_window() {
        let window = DateWindow::around(date(2021, 5, 1), 7, date(2026, 1, 1));
        let mentions = vec![
            mention(1, date(2021, 5, 1), SEED),
            mention(1, date(2021, 4, 28), "https://a.example.com/"),
            mention(1, date(2021, 5, 3), "https://b.example.com/"),
            mention(1, date(2021, 5, 10), "https://c.example.com/"),
        ];
        let records = join_mentions(SEED, &window, mentions).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| window.contains(r.event_date)));
    }
}
