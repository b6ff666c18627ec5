//! Image download pipeline.
//!
//! A download fetches a URL with bounded retries, sniffs the real image
//! format from the first bytes of the body, and streams the body into a
//! caller-supplied writer or a newly created file.
//!
//! # Features
//!
//! - Streaming downloads; only the sniff window is buffered
//! - Format detection from signature bytes, never from the URL or headers
//! - Exclusive file creation (no silent overwrite), partial files removed on error
//! - Optional SHA-256 content hash computed while streaming
//! - Batch downloads over a bounded worker pool with content-addressed naming
//!
//! # Example
//!
//! ```no_run
//! use imagecapture_core::download::{DownloadTarget, DownloaderConfig, ImageDownloader};
//! use reqwest::header::HeaderMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ImageDownloader::new(DownloaderConfig::default(), HeaderMap::new())?;
//! let mut buffer: Vec<u8> = Vec::new();
//! let kind = downloader
//!     .download("https://example.com/cat.jpg", DownloadTarget::Writer(&mut buffer))
//!     .await?;
//! println!("{} bytes of {}", buffer.len(), kind.mime_type());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod image;
mod retry;

pub use client::{DownloadOutcome, DownloadTarget, DownloaderConfig, ImageDownloader};
pub(crate) use client::{build_client, send_checked, send_with_retry};
pub use error::{BatchError, DownloadError};
pub use image::{ImageKind, ImageStream};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
