//! Data models for dataset rows and enriched article records.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`EventRow`]: A row of the GDELT events table
//! - [`MentionRow`]: A row of the GDELT mentions table
//! - [`ArticleRecord`]: A candidate related article, enriched in place
//! - [`EventMetadata`]: Actor, location and tone fields carried through untouched
//!
//! Records serialize with snake_case field names and `YYYY-MM-DD` dates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Actor, location and sentiment fields of a GDELT event.
///
/// Every field is optional: GDELT rows routinely leave actors or geography
/// blank. The pipeline never interprets these values, it only passes them
/// through to the output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EventMetadata {
    pub actor1_name: Option<String>,
    pub actor1_country_code: Option<String>,
    pub actor2_name: Option<String>,
    pub actor2_country_code: Option<String>,
    pub action_geo_type: Option<i64>,
    pub action_geo_full_name: Option<String>,
    pub action_geo_country_code: Option<String>,
    /// Average tone of all documents mentioning the event (-100..100).
    pub avg_tone: Option<f64>,
    /// Goldstein scale of the event type (-10..10).
    pub goldstein_scale: Option<f64>,
    pub num_articles: Option<i64>,
}

/// A row of the events table.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub event_id: u64,
    pub date: NaiveDate,
    pub source_url: Option<String>,
    pub metadata: EventMetadata,
}

/// A row of the mentions table: one article reporting on one event.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionRow {
    pub event_id: u64,
    /// The URL (or other identifier) of the mentioning document.
    pub mention_identifier: String,
    pub date: NaiveDate,
}

/// A candidate related article.
///
/// Created by the resolver with `content` and `language` unset, then filled
/// in by the enricher. Records whose content never gets set are dropped
/// before they reach the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    /// Distinct event identifiers this article is associated with, first-seen order.
    pub event_ids: Vec<u64>,
    pub event_date: NaiveDate,
    /// The article URL; identity of the record for URL deduplication.
    pub source_url: String,
    /// Present only for records resolved through the events table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    pub content: Option<String>,
    pub language: Option<String>,
}

impl ArticleRecord {
    /// A fresh, not yet enriched record.
    pub fn new(event_ids: Vec<u64>, event_date: NaiveDate, source_url: impl Into<String>) -> Self {
        Self {
            event_ids,
            event_date,
            source_url: source_url.into(),
            metadata: None,
            content: None,
            language: None,
        }
    }

    /// Build a record from an events table row. Rows without a source URL
    /// cannot be fetched and yield `None`.
    pub fn from_event_row(row: EventRow) -> Option<Self> {
        let url = row.source_url?;
        let mut record = Self::new(vec![row.event_id], row.date, url);
        record.metadata = Some(row.metadata);
        Some(record)
    }

    /// True once the enricher stored non-empty content.
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }
}
