//! Image search across search-engine backends.
//!
//! [`ImageCapture`] is the capability every backend offers: bounded search,
//! paged search with caller-driven stopping, and downloads through an
//! embedded [`ImageDownloader`]. [`SearchEngine`] implements it for any
//! [`Site`]; [`BaiduCapture`] and [`BingCapture`] are the shipped backends.
//!
//! # Example
//!
//! ```no_run
//! use imagecapture_core::search::{BingCapture, BingSite, CaptureConfig, ImageCapture, SearchOption};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let capture = BingCapture::new(BingSite::new(), CaptureConfig::default())?;
//! let urls = capture.search("red panda", 50, &[SearchOption::Animated]).await?;
//! for url in &urls {
//!     println!("{url}");
//! }
//! # Ok(())
//! # }
//! ```

mod baidu;
mod bing;
mod engine;
mod error;
mod query;
mod site;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use baidu::{BaiduCapture, BaiduSite};
pub use bing::{BingCapture, BingSite};
pub use engine::{CaptureConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOTAL_CACHE_LIFETIME, SearchEngine};
pub use error::SearchError;
pub use query::{ImageSize, Query, SearchOption};
pub use site::{Candidate, Site, UNBOUNDED_TOTAL};

use crate::download::{BatchError, DownloadError, DownloadTarget, ImageDownloader, ImageKind};

/// Search and download operations shared by every backend.
#[async_trait]
pub trait ImageCapture: Send + Sync {
    /// Collects up to `max_count` unique image URLs for `keyword`.
    ///
    /// Best effort: pages that fail and pages still running at the deadline
    /// contribute nothing, and the call still succeeds. A `max_count` of 0
    /// returns nothing without sending a request.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Pool`] if a page task cannot be submitted.
    async fn search(
        &self,
        keyword: &str,
        max_count: usize,
        options: &[SearchOption],
    ) -> Result<Vec<String>, SearchError>;

    /// Fetches result pages one at a time, handing each page's URLs to
    /// `on_page`. Paging stops when `on_page` returns `false`, when the
    /// reported total is reached, or after an empty page on backends that
    /// cannot report a total.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Pool`] if a page task cannot be submitted and
    /// the count lookup's error if the total cannot be read.
    async fn range_search(
        &self,
        keyword: &str,
        on_page: &mut (dyn FnMut(Vec<String>) -> bool + Send),
        options: &[SearchOption],
    ) -> Result<(), SearchError>;

    /// Downloader used for [`download`](Self::download) and
    /// [`batch_download`](Self::batch_download).
    fn downloader(&self) -> &ImageDownloader;

    /// Downloads one image. See [`ImageDownloader::download`].
    ///
    /// # Errors
    ///
    /// Any [`DownloadError`] from the download.
    async fn download(
        &self,
        url: &str,
        target: DownloadTarget<'_>,
    ) -> Result<ImageKind, DownloadError> {
        self.downloader().download(url, target).await
    }

    /// Downloads many images into `dir`. See
    /// [`ImageDownloader::batch_download`].
    ///
    /// # Errors
    ///
    /// Any [`BatchError`] from the batch.
    async fn batch_download(
        &self,
        urls: &[String],
        dir: &Path,
        hash_naming: bool,
    ) -> Result<Vec<PathBuf>, BatchError> {
        self.downloader().batch_download(urls, dir, hash_naming).await
    }

    /// Stops accepting work. Later calls fail with a closed-pool error.
    fn shutdown(&self);
}
