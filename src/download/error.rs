//! Error types for the download module.
//!
//! Variants carry the URL or path they concern so a single log line is
//! enough to diagnose a failure.

use std::path::PathBuf;

use thiserror::Error;

use crate::pool::PoolError;

/// Errors from a single download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response. Never retried.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Every attempt failed with a transient error.
    #[error("giving up on {url} after {attempts} attempts: {source}")]
    RetryExhausted {
        /// The URL that kept failing.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        source: Box<DownloadError>,
    },

    /// The payload's leading bytes do not match any known image format.
    #[error("unsupported or undetected content type at {url}")]
    UnsupportedType {
        /// The URL whose payload was rejected.
        url: String,
    },

    /// The payload exceeds the configured byte ceiling.
    #[error("content at {url} exceeds {limit} bytes")]
    ContentTooLarge {
        /// The offending URL.
        url: String,
        /// The configured ceiling.
        limit: u64,
    },

    /// The target path has no file name component.
    #[error("invalid target path: {path}")]
    InvalidTargetPath {
        /// The rejected path.
        path: PathBuf,
    },

    /// The target file already exists and will not be overwritten.
    #[error("file already exists: {path}")]
    AlreadyExists {
        /// The existing file.
        path: PathBuf,
    },

    /// File system error (create directory, create file, write).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing into a caller-supplied sink failed.
    #[error("failed writing to sink: {source}")]
    Sink {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The download pool could not be created.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a transport error, separating timeouts from other failures.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Wraps the last transient failure once the attempt ceiling is hit.
    pub fn retry_exhausted(url: impl Into<String>, attempts: u32, last: DownloadError) -> Self {
        Self::RetryExhausted {
            url: url.into(),
            attempts,
            source: Box::new(last),
        }
    }

    /// Creates an unsupported content type error.
    pub fn unsupported_type(url: impl Into<String>) -> Self {
        Self::UnsupportedType { url: url.into() }
    }

    /// Creates a content-too-large error.
    pub fn content_too_large(url: impl Into<String>, limit: u64) -> Self {
        Self::ContentTooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort a whole batch.
///
/// Individual download failures never appear here; they only shrink the
/// returned path list.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A download task could not be submitted.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The output directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
