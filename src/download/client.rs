//! HTTP client wrapper for downloading images.
//!
//! [`ImageDownloader`] owns a pooled `reqwest::Client` configured with the
//! caller's headers, a retry policy and the worker pool used for batches. It
//! is cheap to clone; clones share the connection pool and the worker pool.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf, is_separator};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{
    BATCH_BASE_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_DOWNLOAD_CONCURRENCY, DOWNLOAD_TIMEOUT,
    MAX_DOWNLOAD_ATTEMPTS,
};
use super::error::DownloadError;
use super::image::{ImageKind, ImageStream};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::pool::WorkerPool;
use crate::user_agent;

/// Download tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Concurrent downloads in a batch; 0 selects the default.
    pub concurrency: usize,
    /// Deadline for one attempt, body included.
    pub download_timeout: Duration,
    /// Per-item base for the batch deadline.
    pub batch_base_timeout: Duration,
    /// Attempts per download, the first one included.
    pub max_attempts: u32,
    /// Reject payloads larger than this many bytes.
    pub max_bytes: Option<u64>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            download_timeout: DOWNLOAD_TIMEOUT,
            batch_base_timeout: BATCH_BASE_TIMEOUT,
            max_attempts: MAX_DOWNLOAD_ATTEMPTS,
            max_bytes: None,
        }
    }
}

/// Where a download is written.
pub enum DownloadTarget<'a> {
    /// A new file at `<path>.<ext>`. Missing parent directories are created;
    /// an existing file is never overwritten.
    Path(&'a Path),
    /// A caller-owned writer. It is flushed but not closed.
    Writer(&'a mut (dyn AsyncWrite + Send + Unpin)),
}

/// Result of [`ImageDownloader::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Sniffed image format.
    pub kind: ImageKind,
    /// File written, for [`DownloadTarget::Path`].
    pub path: Option<PathBuf>,
    /// Body size in bytes.
    pub bytes_written: u64,
    /// Lowercase hex SHA-256 of the body, when requested.
    pub content_hash: Option<String>,
}

/// Streams images to files or writers.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use imagecapture_core::download::{DownloadTarget, DownloaderConfig, ImageDownloader};
/// use reqwest::header::HeaderMap;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let downloader = ImageDownloader::new(DownloaderConfig::default(), HeaderMap::new())?;
/// let kind = downloader
///     .download("https://example.com/cat", DownloadTarget::Path(Path::new("./images/cat")))
///     .await?;
/// println!("saved ./images/cat.{}", kind.extension());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    client: Client,
    retry: RetryPolicy,
    config: DownloaderConfig,
    pool: WorkerPool,
}

impl ImageDownloader {
    /// Creates a downloader sending `headers` with every request.
    ///
    /// A browser User-Agent is added when `headers` has none.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the HTTP client cannot be built
    /// and [`DownloadError::Pool`] if the concurrency is out of range.
    pub fn new(config: DownloaderConfig, headers: HeaderMap) -> Result<Self, DownloadError> {
        let client = build_client(headers, config.download_timeout)?;
        Self::with_client(client, config)
    }

    /// Creates a downloader around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Pool`] if the concurrency is out of range.
    pub fn with_client(client: Client, config: DownloaderConfig) -> Result<Self, DownloadError> {
        let concurrency = if config.concurrency == 0 {
            DEFAULT_DOWNLOAD_CONCURRENCY
        } else {
            config.concurrency
        };
        let pool = WorkerPool::new(concurrency)?;
        Ok(Self {
            client,
            retry: RetryPolicy::with_max_attempts(config.max_attempts),
            config,
            pool,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stops accepting batch work. Downloads already running finish.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Downloads `url` into `target`, returning the sniffed format.
    ///
    /// For [`DownloadTarget::Path`] the file is `<path>.<kind.extension()>`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn download(
        &self,
        url: &str,
        target: DownloadTarget<'_>,
    ) -> Result<ImageKind, DownloadError> {
        self.fetch(url, target, false).await.map(|outcome| outcome.kind)
    }

    /// Downloads `url` into `target`, optionally hashing the body.
    ///
    /// Transport failures are retried up to the attempt ceiling; an HTTP
    /// error status is returned immediately. The payload is rejected before
    /// any file is created if its leading bytes are not a known image.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] for an unparsable URL
    /// - [`DownloadError::HttpStatus`] for a non-success response
    /// - [`DownloadError::RetryExhausted`] when every attempt hit a transport error
    /// - [`DownloadError::UnsupportedType`] for non-image payloads
    /// - [`DownloadError::ContentTooLarge`] above the byte ceiling
    /// - [`DownloadError::AlreadyExists`] / [`DownloadError::InvalidTargetPath`] /
    ///   [`DownloadError::Io`] for file targets
    /// - [`DownloadError::Sink`] for writer targets
    #[instrument(skip(self, url, target), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        target: DownloadTarget<'_>,
        hash: bool,
    ) -> Result<DownloadOutcome, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let timeout = self.config.download_timeout;
        let response =
            send_with_retry(&self.retry, url, || self.client.get(url).timeout(timeout)).await?;

        let limit = self.config.max_bytes;
        if let (Some(limit), Some(length)) = (limit, response.content_length())
            && length > limit
        {
            return Err(DownloadError::content_too_large(url, limit));
        }

        let mut stream = ImageStream::new(response.bytes_stream(), hash)
            .await
            .map_err(|e| DownloadError::transport(url, e))?;
        let Some(kind) = stream.kind() else {
            return Err(DownloadError::unsupported_type(url));
        };
        debug!(%kind, "sniffed image type");

        match target {
            DownloadTarget::Writer(writer) => {
                let bytes_written = copy_body(&mut stream, writer, url, limit, |source| {
                    DownloadError::Sink { source }
                })
                .await?;
                Ok(DownloadOutcome {
                    kind,
                    path: None,
                    bytes_written,
                    content_hash: stream.content_hash(),
                })
            }
            DownloadTarget::Path(base) => {
                let path = path_with_extension(base, kind)?;
                let file = create_exclusive(&path).await?;
                let mut writer = BufWriter::new(file);
                let copied = copy_body(&mut stream, &mut writer, url, limit, |source| {
                    DownloadError::io(path.clone(), source)
                })
                .await;
                drop(writer);

                let bytes_written = match copied {
                    Ok(bytes_written) => bytes_written,
                    Err(error) => {
                        debug!(path = %path.display(), "cleaning up partial file after error");
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(error);
                    }
                };

                info!(path = %path.display(), bytes = bytes_written, "image saved");
                Ok(DownloadOutcome {
                    kind,
                    path: Some(path),
                    bytes_written,
                    content_hash: stream.content_hash(),
                })
            }
        }
    }
}

/// Builds a pooled client with default headers and a whole-request timeout.
pub(crate) fn build_client(
    mut headers: HeaderMap,
    timeout: Duration,
) -> Result<Client, DownloadError> {
    if !headers.contains_key(USER_AGENT) {
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(user_agent::default_download_user_agent()),
        );
    }
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .gzip(true)
        .default_headers(headers)
        .build()
        .map_err(|source| DownloadError::Client { source })
}

/// Sends one request, mapping transport errors and non-success statuses.
pub(crate) async fn send_checked(
    url: &str,
    request: RequestBuilder,
) -> Result<Response, DownloadError> {
    let response = request
        .send()
        .await
        .map_err(|e| DownloadError::transport(url, e))?;

    let status = response.status();
    if !status.is_success() {
        debug!(url, status = status.as_u16(), "non-success response");
        return Err(DownloadError::http_status(url, status.as_u16()));
    }
    Ok(response)
}

/// Sends a request built by `build`, retrying transport failures.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed
/// by sending it.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryPolicy,
    url: &str,
    mut build: F,
) -> Result<Response, DownloadError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 1;
    loop {
        let error = match send_checked(url, build()).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        let failure = classify_error(&error);
        match policy.should_retry(failure, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                debug!(url, attempt, error = %error, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                attempt = next;
            }
            RetryDecision::DoNotRetry { .. } if failure == FailureType::Transient => {
                return Err(DownloadError::retry_exhausted(url, attempt, error));
            }
            RetryDecision::DoNotRetry { .. } => return Err(error),
        }
    }
}

async fn copy_body<S, W, F>(
    stream: &mut ImageStream<S>,
    writer: &mut W,
    url: &str,
    limit: Option<u64>,
    write_error: F,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
    F: Fn(std::io::Error) -> DownloadError,
{
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next_chunk().await {
        let chunk = chunk.map_err(|e| DownloadError::transport(url, e))?;
        written += chunk.len() as u64;
        if let Some(limit) = limit
            && written > limit
        {
            return Err(DownloadError::content_too_large(url, limit));
        }
        writer.write_all(&chunk).await.map_err(&write_error)?;
    }
    writer.flush().await.map_err(&write_error)?;
    Ok(written)
}

fn path_with_extension(base: &Path, kind: ImageKind) -> Result<PathBuf, DownloadError> {
    let raw = base.as_os_str();
    let ends_with_separator = raw.to_string_lossy().ends_with(is_separator);
    if base.file_name().is_none() || ends_with_separator {
        return Err(DownloadError::InvalidTargetPath {
            path: base.to_path_buf(),
        });
    }
    let mut with_ext = OsString::from(raw);
    with_ext.push(".");
    with_ext.push(kind.extension());
    Ok(PathBuf::from(with_ext))
}

async fn create_exclusive(path: &Path) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|source| {
            if source.kind() == ErrorKind::AlreadyExists {
                DownloadError::AlreadyExists {
                    path: path.to_path_buf(),
                }
            } else {
                DownloadError::io(path, source)
            }
        })
}
