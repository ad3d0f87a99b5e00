//! Access to the GDELT event dataset.
//!
//! The resolver never talks to a query service directly. It goes through the
//! [`EventDataset`] trait, which exposes exactly the three lookups the
//! resolution strategies need:
//!
//! | Lookup | Table | Used by |
//! |--------|-------|---------|
//! | [`EventDataset::events_for_url`] | events | identifier-cluster |
//! | [`EventDataset::events_in_window`] | events | identifier-cluster |
//! | [`EventDataset::mentions_in_window`] | mentions | mention-join |
//!
//! [`bigquery::BigQueryClient`] is the production implementation. Tests use
//! in-memory fakes.
//!
//! Query services hand rows back as field-name → value mappings ([`Row`]).
//! The `decode_*` helpers turn those into typed rows, accepting values either
//! as JSON numbers or as the decimal strings BigQuery emits.

pub mod bigquery;

use crate::error::DatasetError;
use crate::models::{EventMetadata, EventRow, MentionRow};
use crate::resolver::DateWindow;
use crate::utils::from_gdelt_date;
use serde_json::{Map, Value};

/// A result row keyed by column name.
pub type Row = Map<String, Value>;

/// Read-only view of the event dataset.
pub trait EventDataset {
    /// Events whose source URL is exactly `url`, at most `limit` rows,
    /// earliest first.
    async fn events_for_url(&self, url: &str, limit: usize) -> Result<Vec<EventRow>, DatasetError>;

    /// Events with an identifier in `event_ids`, dated inside `window`, that
    /// carry a source URL.
    async fn events_in_window(
        &self,
        event_ids: &[u64],
        window: &DateWindow,
    ) -> Result<Vec<EventRow>, DatasetError>;

    /// Every mention dated inside `window`.
    async fn mentions_in_window(&self, window: &DateWindow) -> Result<Vec<MentionRow>, DatasetError>;
}

fn field<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.get(name).filter(|v| !v.is_null())
}

fn field_str(row: &Row, name: &str) -> Option<String> {
    match field(row, name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn field_i64(row: &Row, name: &str) -> Option<i64> {
    match field(row, name)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_f64(row: &Row, name: &str) -> Option<f64> {
    match field(row, name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn required_id(row: &Row) -> Result<u64, DatasetError> {
    field_i64(row, "GLOBALEVENTID")
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| DatasetError::Decode(format!("missing or invalid GLOBALEVENTID in {row:?}")))
}

/// Decode a row of the events table.
///
/// `GLOBALEVENTID` and `SQLDATE` are required; everything else is optional.
pub fn decode_event_row(row: &Row) -> Result<EventRow, DatasetError> {
    let event_id = required_id(row)?;
    let date = field_i64(row, "SQLDATE")
        .and_then(from_gdelt_date)
        .ok_or_else(|| DatasetError::Decode(format!("missing or invalid SQLDATE for event {event_id}")))?;

    Ok(EventRow {
        event_id,
        date,
        source_url: field_str(row, "SOURCEURL"),
        metadata: EventMetadata {
            actor1_name: field_str(row, "Actor1Name"),
            actor1_country_code: field_str(row, "Actor1CountryCode"),
            actor2_name: field_str(row, "Actor2Name"),
            actor2_country_code: field_str(row, "Actor2CountryCode"),
            action_geo_type: field_i64(row, "ActionGeo_Type"),
            action_geo_full_name: field_str(row, "ActionGeo_FullName"),
            action_geo_country_code: field_str(row, "ActionGeo_CountryCode"),
            avg_tone: field_f64(row, "AvgTone"),
            goldstein_scale: field_f64(row, "GoldsteinScale"),
            num_articles: field_i64(row, "NumArticles"),
        },
    })
}

/// Decode a row of the mentions table.
pub fn decode_mention_row(row: &Row) -> Result<MentionRow, DatasetError> {
    let event_id = required_id(row)?;
    let mention_identifier = field_str(row, "MentionIdentifier")
        .ok_or_else(|| DatasetError::Decode(format!("missing MentionIdentifier for event {event_id}")))?;
    let date = field_i64(row, "MentionTimeDate")
        .and_then(from_gdelt_date)
        .ok_or_else(|| DatasetError::Decode(format!("missing or invalid MentionTimeDate for event {event_id}")))?;

    Ok(MentionRow {
        event_id,
        mention_identifier,
        date,
    })
}
