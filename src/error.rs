//! Error types for each pipeline layer.
//!
//! Per-article failures ([`FetchError`], [`DetectError`]) never leave the
//! enricher; they are logged and turned into an
//! [`EnrichOutcome::Failed`](crate::enricher::EnrichOutcome). Dataset failures
//! ([`DatasetError`]) are fatal for the invocation and reach the caller wrapped
//! in [`PipelineError`].

use thiserror::Error;

/// Failure to fetch an article page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
}

/// Failure to identify the language of a text.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no language could be detected")]
    Indeterminate,
}

/// Failure talking to the event dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("query service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("query did not complete after {0} polls")]
    Incomplete(usize),
    #[error("malformed row: {0}")]
    Decode(String),
    #[error("invalid dataset name {0:?}")]
    InvalidDataset(String),
}

/// Fatal error for one pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
