//! Utility functions for text truncation, GDELT date handling, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Content truncation with an ellipsis marker
//! - String truncation for logging
//! - Conversion between calendar dates and GDELT's integer date encodings
//! - File system validation for the output path

use chrono::{Datelike, NaiveDate};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Marker appended to article content that was cut at the length limit.
pub const ELLIPSIS: &str = "...";

/// Truncate article content to `max_length` characters.
///
/// Text longer than `max_length` characters is cut to exactly `max_length`
/// characters and [`ELLIPSIS`] is appended. Shorter text is returned
/// unchanged. Lengths are counted in `char`s so multi-byte text is never
/// split mid-character.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_content("abcdef".into(), 3), "abc...");
/// assert_eq!(truncate_content("abc".into(), 3), "abc");
/// ```
pub fn truncate_content(text: String, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((byte_idx, _)) => {
            let mut cut = text;
            cut.truncate(byte_idx);
            cut.push_str(ELLIPSIS);
            cut
        }
        None => text,
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}…(+{} bytes)", &s[..byte_idx], s.len() - byte_idx),
        None => s.to_string(),
    }
}

/// Encode a date the way GDELT's `SQLDATE` column does (`YYYYMMDD`).
pub fn to_sqldate(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

/// Decode a GDELT `SQLDATE` (`YYYYMMDD`) or `DATEADDED` / `MentionTimeDate`
/// (`YYYYMMDDHHMMSS`) value into a calendar date.
pub fn from_gdelt_date(value: i64) -> Option<NaiveDate> {
    let digits = value.to_string();
    let day = digits.get(..8)?;
    NaiveDate::parse_from_str(day, "%Y%m%d").ok()
}

/// Parse a user supplied `YYYY-MM-DD` date.
pub fn parse_event_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

/// Ensure the directory that will hold `file_path` exists and is writable.
///
/// Creates the parent directory if needed, then performs a write test by
/// creating and immediately deleting a probe file. A bare file name (no
/// parent component) checks the current directory.
#[instrument(level = "info", skip_all, fields(path = %file_path))]
pub async fn ensure_writable_parent(file_path: &str) -> Result<(), Box<dyn Error>> {
    let parent = match Path::new(file_path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&parent).await?;

    let probe_path = parent.join("..__probe_write__");
    fs::File::create(&probe_path).await?;
    let _ = fs::remove_file(&probe_path).await;
    info!(dir = %parent.display(), "Output directory is writable");
    Ok(())
}
