//! Batch downloads across the downloader's worker pool.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use imagecapture_core::download::{DownloaderConfig, ImageDownloader};
//! use reqwest::header::HeaderMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ImageDownloader::new(DownloaderConfig::default(), HeaderMap::new())?;
//! let urls = vec!["https://example.com/a.jpg".to_string()];
//! let saved = downloader.batch_download(&urls, Path::new("./images"), true).await?;
//! println!("saved {} of {} images", saved.len(), urls.len());
//! # Ok(())
//! # }
//! ```

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::client::{DownloadTarget, ImageDownloader};
use super::error::BatchError;
use crate::pool::{PoolError, collect_until};
use crate::timeout::calculate_timeout;

impl ImageDownloader {
    /// Downloads every URL into `dir`, returning the paths that were saved.
    ///
    /// Files are named `<uuid>.<ext>`; with `hash_naming` each file is renamed
    /// to `<sha256>.<ext>` after it is fully written, so identical content
    /// always lands on the same name.
    ///
    /// The whole batch runs under one deadline scaled from the URL count and
    /// pool size. Failed downloads and downloads still running at the deadline
    /// are simply missing from the result.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::CreateDirectory`] if `dir` cannot be created and
    /// [`BatchError::Pool`] if a download cannot be submitted.
    #[instrument(skip(self, urls), fields(count = urls.len(), dir = %dir.display()))]
    pub async fn batch_download(
        &self,
        urls: &[String],
        dir: &Path,
        hash_naming: bool,
    ) -> Result<Vec<PathBuf>, BatchError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| BatchError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;

        let pool = self.pool();
        let timeout = calculate_timeout(
            urls.len(),
            1,
            pool.size(),
            self.config().batch_base_timeout,
        );
        let deadline = Instant::now() + timeout;
        debug!(timeout_ms = timeout.as_millis(), "batch deadline computed");

        let (tx, mut rx) = mpsc::channel::<PathBuf>(pool.size());
        let dispatch = async move {
            for url in urls {
                let downloader = self.clone();
                let url = url.clone();
                let dir = dir.to_path_buf();
                let tx = tx.clone();
                pool.submit(async move {
                    if Instant::now() >= deadline {
                        return;
                    }
                    if let Some(path) = downloader.save_one(&url, &dir, hash_naming).await {
                        let _ = tx.send(path).await;
                    }
                })
                .await?;
            }
            drop(tx);
            Ok::<(), PoolError>(())
        };

        let mut paths = Vec::with_capacity(urls.len());
        let completion = collect_until(dispatch, &mut rx, deadline, |path| {
            paths.push(path);
            ControlFlow::Continue(())
        })
        .await?;

        info!(saved = paths.len(), requested = urls.len(), ?completion, "batch finished");
        Ok(paths)
    }

    async fn save_one(&self, url: &str, dir: &Path, hash_naming: bool) -> Option<PathBuf> {
        let base = dir.join(Uuid::new_v4().to_string());
        let outcome = match self.fetch(url, DownloadTarget::Path(&base), hash_naming).await {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(url, %error, "download failed, skipping");
                return None;
            }
        };
        let path = outcome.path?;

        let Some(hash) = outcome.content_hash.filter(|_| hash_naming) else {
            return Some(path);
        };
        let hashed = dir.join(format!("{hash}.{}", outcome.kind.extension()));
        // Same name means same bytes; keep the existing file.
        if tokio::fs::try_exists(&hashed).await.unwrap_or(false) {
            if let Err(error) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), %error, "failed to remove duplicate download");
            }
            debug!(path = %hashed.display(), "content already saved");
            return Some(hashed);
        }
        match tokio::fs::rename(&path, &hashed).await {
            Ok(()) => Some(hashed),
            Err(error) => {
                warn!(from = %path.display(), to = %hashed.display(), %error, "failed to rename to content hash");
                Some(path)
            }
        }
    }
}
