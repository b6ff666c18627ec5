//! Error types for the search module.

use thiserror::Error;

use crate::download::DownloadError;
use crate::pool::PoolError;

/// Errors surfaced by a search call.
///
/// Per-page failures never appear here; a failed page only contributes
/// nothing to the result.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A page task could not be submitted.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A request outside the per-page workers failed (total-count lookup).
    #[error("search request failed: {0}")]
    Request(#[from] DownloadError),

    /// The total-count response could not be decoded.
    #[error("failed to read result count from {url}: {reason}")]
    TotalCount {
        /// The count endpoint.
        url: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// The search client or its downloader could not be built.
    #[error("failed to set up search client: {source}")]
    Setup {
        /// The construction failure.
        #[source]
        source: DownloadError,
    },
}

impl SearchError {
    /// Creates a total-count decode error.
    pub fn total_count(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TotalCount {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
