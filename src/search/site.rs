//! Per-site request shape and response extraction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;

use super::error::SearchError;
use super::query::{Query, SearchOption};

/// Total reported by sites that cannot count their results.
pub const UNBOUNDED_TOTAL: usize = usize::MAX;

/// One image URL extracted from a result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Preferred URL, usually the full-size original.
    pub url: String,
    /// Used instead of `url` when the original does not answer with 2xx.
    pub fallback: Option<String>,
}

impl Candidate {
    /// A URL taken as-is.
    #[must_use]
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fallback: None,
        }
    }

    /// A URL that is probed first, with a fallback.
    #[must_use]
    pub fn with_fallback(url: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fallback: Some(fallback.into()),
        }
    }
}

/// A search backend: how to build page requests and read page responses.
///
/// The engine owns pagination, concurrency, deadlines, filtering and dedup;
/// a site only knows its own endpoint, parameters and markup.
#[async_trait]
pub trait Site: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Result page endpoint, without query string.
    fn endpoint(&self) -> &str;

    /// Headers sent with every request, downloads included.
    fn headers(&self) -> HeaderMap;

    /// Fixed parameters every page request starts from.
    fn base_query(&self) -> Query;

    /// Parameter carrying the keyword.
    fn keyword_param(&self) -> &'static str;

    /// Parameter carrying the result offset.
    fn offset_param(&self) -> &'static str;

    /// Maps a search option onto this site's parameters.
    fn apply_option(&self, query: &mut Query, option: SearchOption);

    /// Results returned by one page request.
    fn batch_size(&self) -> usize;

    /// Budget for one round of page requests.
    fn base_timeout(&self) -> Duration;

    /// Pulls candidate image URLs out of a result page body.
    fn extract(&self, body: &str) -> Vec<Candidate>;

    /// Total number of results for `query`.
    ///
    /// Sites without a count endpoint report [`UNBOUNDED_TOTAL`].
    async fn total_count(&self, _client: &Client, _query: &Query) -> Result<usize, SearchError> {
        Ok(UNBOUNDED_TOTAL)
    }
}
