//! Image search crawler core library.
//!
//! Crawls image-search result pages, extracts direct image URLs under a time
//! and result budget, drops unwanted sources, and downloads images with
//! content sniffing and optional content-hash naming.
//!
//! # Architecture
//!
//! - [`search`] - search backends and the dispatch/aggregation engine
//! - [`download`] - streaming image downloads, retries and batch downloads
//! - [`pool`] - bounded worker pool and deadline-bounded fan-in
//! - [`filter`] - host-suffix exclusion rules
//! - [`cache`] - Bloom filter and TTL cache
//! - [`timeout`] - deadline scaling for searches and batches

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod download;
pub mod filter;
pub mod pool;
pub mod search;
pub mod timeout;

mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use cache::{BloomError, BloomFilter, Cache};
pub use download::{
    BatchError, DownloadError, DownloadOutcome, DownloadTarget, DownloaderConfig, ImageDownloader,
    ImageKind,
};
pub use filter::{Rule, RuleSet};
pub use pool::{PoolError, WorkerPool};
pub use search::{
    BaiduCapture, BaiduSite, BingCapture, BingSite, CaptureConfig, ImageCapture, ImageSize,
    SearchError, SearchOption,
};
pub use timeout::calculate_timeout;
