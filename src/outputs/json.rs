//! JSON output of the enriched records.
//!
//! Records are written as a pretty-printed JSON array, either to a file or,
//! when no path is given, to stdout. Logs go to stderr, so stdout carries
//! nothing but the JSON document.

use crate::models::ArticleRecord;
use std::error::Error;
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tracing::{info, instrument};

/// Serialize `records` as a JSON array.
pub fn to_json(records: &[ArticleRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

/// Write `records` to `output`, or to stdout when `output` is `None`.
///
/// # Arguments
///
/// * `records` - The enriched records, in output order
/// * `output` - Destination file path; `None` writes to stdout
///
/// # Returns
///
/// `Ok(())` once the whole document is written and flushed. An empty slice
/// still produces a valid `[]` document.
///
/// # Examples
///
/// ```ignore
/// write_records(&records, Some("related.json")).await?;
/// write_records(&[], None).await?; // prints "[]"
/// ```
#[instrument(level = "info", skip_all, fields(count = records.len(), output = output.unwrap_or("-")))]
pub async fn write_records(records: &[ArticleRecord], output: Option<&str>) -> Result<(), Box<dyn Error>> {
    let mut json = to_json(records)?;
    json.push('\n');

    match output {
        Some(path) => {
            fs::write(path, json).await?;
            info!(%path, "Wrote JSON output");
        }
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(json.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
