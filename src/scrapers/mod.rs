//! Article page fetching and text extraction.
//!
//! Related articles come from every outlet GDELT indexes, so there is no
//! per-site scraper here. Every page goes through the same two steps:
//!
//! 1. **Fetching**: [`PageFetcher::fetch`] downloads the page. [`HttpFetcher`]
//!    sends a desktop browser user agent and gives up after
//!    [`FETCH_TIMEOUT`](article::FETCH_TIMEOUT).
//! 2. **Extraction**: [`extract_paragraph_text`] keeps the text of every
//!    `<p>` element, joined by single spaces.
//!
//! Fetch failures (network errors, non-2xx statuses) are returned as
//! [`FetchError`](crate::error::FetchError); the enricher logs and skips them.

pub mod article;

pub use article::{HttpFetcher, PageFetcher, extract_paragraph_text};
