//! Search dispatch and aggregation.
//!
//! A search is split into page tasks, one per `batch_size` slice of the
//! offset space. Tasks run on the engine's [`WorkerPool`] and push extracted
//! URLs into a bounded channel; the caller side filters, dedups and stops at
//! the target count, the deadline, or when every task has finished.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::error::SearchError;
use super::query::{Query, SearchOption};
use super::site::{Candidate, Site, UNBOUNDED_TOTAL};
use super::ImageCapture;
use crate::cache::Cache;
use crate::download::{
    DownloadError, DownloaderConfig, ImageDownloader, RetryPolicy, build_client, send_checked,
    send_with_retry,
};
use crate::filter::RuleSet;
use crate::pool::{DEFAULT_POOL_SIZE, PoolError, WorkerPool, collect_until};
use crate::timeout::calculate_timeout;

/// Deadline for a single page request or fallback probe.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a reported result count is reused.
pub const DEFAULT_TOTAL_CACHE_LIFETIME: Duration = Duration::from_secs(600);

/// Distinct queries whose result count is remembered.
const TOTAL_CACHE_CAPACITY: usize = 256;

/// Fallback probes in flight per page.
const PROBE_CONCURRENCY: usize = 8;

/// Search engine configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Concurrent page requests; 0 selects the default.
    pub concurrency: usize,
    /// Deadline for one page request.
    pub request_timeout: Duration,
    /// URLs whose host matches any rule are dropped.
    pub rules: RuleSet,
    /// How long result counts are memoised per query.
    pub total_cache_lifetime: Duration,
    /// Settings for the embedded downloader.
    pub downloader: DownloaderConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_POOL_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rules: RuleSet::default(),
            total_cache_lifetime: DEFAULT_TOTAL_CACHE_LIFETIME,
            downloader: DownloaderConfig::default(),
        }
    }
}

/// One page request, owned by the worker that runs it.
#[derive(Debug)]
struct PageTask {
    offset: usize,
    url: String,
}

/// Image search over one [`Site`].
///
/// Downloads go through the embedded [`ImageDownloader`], which sends the
/// same headers as the search requests.
pub struct SearchEngine<S: Site> {
    site: Arc<S>,
    client: Client,
    pool: WorkerPool,
    retry: RetryPolicy,
    request_timeout: Duration,
    rules: RuleSet,
    totals: Cache<usize>,
    downloader: ImageDownloader,
}

impl<S: Site> SearchEngine<S> {
    /// Creates an engine for `site`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Pool`] for an out-of-range concurrency and
    /// [`SearchError::Setup`] if an HTTP client cannot be built.
    pub fn new(site: S, config: CaptureConfig) -> Result<Self, SearchError> {
        let concurrency = if config.concurrency == 0 {
            DEFAULT_POOL_SIZE
        } else {
            config.concurrency
        };
        let pool = WorkerPool::new(concurrency)?;

        let headers = site.headers();
        let client = build_client(headers.clone(), config.request_timeout)
            .map_err(|source| SearchError::Setup { source })?;
        let downloader = ImageDownloader::new(config.downloader, headers)
            .map_err(|source| SearchError::Setup { source })?;

        Ok(Self {
            site: Arc::new(site),
            client,
            pool,
            retry: RetryPolicy::default(),
            request_timeout: config.request_timeout,
            rules: config.rules,
            totals: Cache::new(TOTAL_CACHE_CAPACITY, config.total_cache_lifetime),
            downloader,
        })
    }

    /// The search backend.
    #[must_use]
    pub fn site(&self) -> &S {
        &self.site
    }

    /// Rules applied to every collected URL.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn build_query(&self, keyword: &str, options: &[SearchOption]) -> Query {
        let mut query = self.site.base_query();
        query.set(self.site.keyword_param(), keyword);
        for option in options {
            self.site.apply_option(&mut query, *option);
        }
        query
    }

    fn page_task(&self, query: &Query, offset: usize) -> PageTask {
        let mut query = query.clone();
        query.set(self.site.offset_param(), offset.to_string());
        PageTask {
            offset,
            url: format!("{}?{}", self.site.endpoint(), query.encode()),
        }
    }

    fn fetcher(&self) -> PageFetcher<S> {
        PageFetcher {
            site: Arc::clone(&self.site),
            client: self.client.clone(),
            retry: self.retry.clone(),
            request_timeout: self.request_timeout,
        }
    }

    async fn total_for(&self, query: &Query) -> Result<usize, SearchError> {
        let key = query.encode();
        if let Some(total) = self.totals.get(&key) {
            debug!(total, "result count from cache");
            return Ok(total);
        }
        let total = self.site.total_count(&self.client, query).await?;
        self.totals.set(key, total);
        Ok(total)
    }

    fn is_excluded(&self, url: &str) -> bool {
        match self.rules.matching_rule(url) {
            Some(rule) => {
                debug!(url, rule = rule.name(), "url excluded");
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl<S: Site> ImageCapture for SearchEngine<S> {
    #[instrument(skip(self, options), fields(site = self.site.name()))]
    async fn search(
        &self,
        keyword: &str,
        max_count: usize,
        options: &[SearchOption],
    ) -> Result<Vec<String>, SearchError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let query = self.build_query(keyword, options);
        let batch = self.site.batch_size().max(1);
        let timeout = calculate_timeout(max_count, batch, self.pool.size(), self.site.base_timeout());
        let deadline = Instant::now() + timeout;
        debug!(timeout_ms = timeout.as_millis(), "search deadline computed");

        let (tx, mut rx) = mpsc::channel::<String>(batch);
        let fetcher = self.fetcher();
        let engine = self;
        let query = &query;
        // Offsets are produced as permits free up; the target count only
        // bounds the loop.
        let dispatch = async move {
            for offset in (0..max_count).step_by(batch) {
                let task = engine.page_task(query, offset);
                engine
                    .pool
                    .submit(fetcher.clone().run(task, deadline, tx.clone()))
                    .await?;
            }
            drop(tx);
            Ok::<(), PoolError>(())
        };

        let mut found =
            HashSet::with_capacity(max_count.min(batch.saturating_mul(self.pool.size())));
        let completion = collect_until(dispatch, &mut rx, deadline, |url| {
            if self.is_excluded(&url) {
                return ControlFlow::Continue(());
            }
            found.insert(url);
            if found.len() >= max_count {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

        info!(found = found.len(), requested = max_count, ?completion, "search finished");
        Ok(found.into_iter().collect())
    }

    #[instrument(skip(self, on_page, options), fields(site = self.site.name()))]
    async fn range_search(
        &self,
        keyword: &str,
        on_page: &mut (dyn FnMut(Vec<String>) -> bool + Send),
        options: &[SearchOption],
    ) -> Result<(), SearchError> {
        let query = self.build_query(keyword, options);
        let total = self.total_for(&query).await?;
        let batch = self.site.batch_size().max(1);

        let mut offset = 0;
        while offset < total {
            let task = self.page_task(&query, offset);
            let deadline = Instant::now() + self.site.base_timeout();
            let (tx, mut rx) = mpsc::channel::<String>(batch);
            let fetcher = self.fetcher();
            let pool = &self.pool;
            let dispatch = async move {
                pool.submit(fetcher.run(task, deadline, tx)).await?;
                Ok::<(), PoolError>(())
            };

            let mut seen = HashSet::new();
            let mut page = Vec::new();
            collect_until(dispatch, &mut rx, deadline, |url| {
                if !self.is_excluded(&url) && seen.insert(url.clone()) {
                    page.push(url);
                }
                ControlFlow::Continue(())
            })
            .await?;

            let exhausted = page.is_empty() && total == UNBOUNDED_TOTAL;
            debug!(offset, count = page.len(), "page collected");
            if !on_page(page) {
                debug!(offset, "caller stopped paging");
                break;
            }
            if exhausted {
                debug!(offset, "empty page, no more results");
                break;
            }
            offset = offset.saturating_add(batch);
        }
        Ok(())
    }

    fn downloader(&self) -> &ImageDownloader {
        &self.downloader
    }

    fn shutdown(&self) {
        self.pool.close();
        self.downloader.close();
    }
}

/// Fetches and resolves one result page on a pool worker.
struct PageFetcher<S> {
    site: Arc<S>,
    client: Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl<S> Clone for PageFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            site: Arc::clone(&self.site),
            client: self.client.clone(),
            retry: self.retry.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: Site> PageFetcher<S> {
    /// Runs `task`, sending every resolved URL to `tx`.
    ///
    /// Failures only mean the page contributes nothing.
    async fn run(self, task: PageTask, deadline: Instant, tx: mpsc::Sender<String>) {
        if Instant::now() >= deadline || tx.is_closed() {
            debug!(offset = task.offset, "collection already over, page skipped");
            return;
        }
        let urls = match tokio::time::timeout_at(deadline, self.fetch(&task)).await {
            Ok(Ok(urls)) => urls,
            Ok(Err(error)) => {
                debug!(offset = task.offset, %error, "page request failed");
                return;
            }
            Err(_) => {
                debug!(offset = task.offset, "page abandoned at deadline");
                return;
            }
        };
        debug!(offset = task.offset, count = urls.len(), "page extracted");
        for url in urls {
            if tx.send(url).await.is_err() {
                break;
            }
        }
    }

    async fn fetch(&self, task: &PageTask) -> Result<Vec<String>, DownloadError> {
        let timeout = self.request_timeout;
        let response = send_with_retry(&self.retry, &task.url, || {
            self.client.get(&task.url).timeout(timeout)
        })
        .await?;
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::transport(&task.url, e))?;

        let candidates = self.site.extract(&body);
        let resolved: Vec<Option<String>> = stream::iter(candidates)
            .map(|candidate| self.resolve(candidate))
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;
        Ok(resolved.into_iter().flatten().collect())
    }

    /// Picks the usable URL of a candidate, probing the primary one when a
    /// fallback exists.
    async fn resolve(&self, candidate: Candidate) -> Option<String> {
        let Candidate { url, fallback } = candidate;
        let Some(fallback) = fallback else {
            return (!url.is_empty()).then_some(url);
        };
        if url.is_empty() {
            return (!fallback.is_empty()).then_some(fallback);
        }
        match send_checked(&url, self.client.get(&url).timeout(self.request_timeout)).await {
            Ok(_) => Some(url),
            Err(error) => {
                debug!(url, %error, "original unreachable, using fallback");
                (!fallback.is_empty()).then_some(fallback)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::header::HeaderMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::filter::Rule;
    use crate::test_support::start_mock_server;

    /// Test backend: one URL per body line, `primary|fallback` for probed ones.
    struct LineSite {
        endpoint: String,
        batch: usize,
        total: usize,
        count_calls: AtomicUsize,
    }

    impl LineSite {
        fn new(server: &MockServer, batch: usize) -> Self {
            Self {
                endpoint: format!("{}/search", server.uri()),
                batch,
                total: UNBOUNDED_TOTAL,
                count_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Site for LineSite {
        fn name(&self) -> &'static str {
            "lines"
        }
        fn endpoint(&self) -> &str {
            &self.endpoint
        }
        fn headers(&self) -> HeaderMap {
            HeaderMap::new()
        }
        fn base_query(&self) -> Query {
            Query::new().with("format", "lines")
        }
        fn keyword_param(&self) -> &'static str {
            "q"
        }
        fn offset_param(&self) -> &'static str {
            "offset"
        }
        fn apply_option(&self, query: &mut Query, option: SearchOption) {
            if option == SearchOption::Latest {
                query.set("latest", "1");
            }
        }
        fn batch_size(&self) -> usize {
            self.batch
        }
        fn base_timeout(&self) -> Duration {
            Duration::from_secs(2)
        }
        fn extract(&self, body: &str) -> Vec<Candidate> {
            body.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| match line.split_once('|') {
                    Some((url, fallback)) => Candidate::with_fallback(url, fallback),
                    None => Candidate::direct(line),
                })
                .collect()
        }
        async fn total_count(&self, _client: &Client, _query: &Query) -> Result<usize, SearchError> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.total)
        }
    }

    fn engine(site: LineSite) -> SearchEngine<LineSite> {
        let config = CaptureConfig {
            rules: RuleSet::empty().with_rule(Rule::new("blocked", ["blocked.example"])),
            ..CaptureConfig::default()
        };
        SearchEngine::new(site, config).unwrap()
    }

    async fn mount_page(server: &MockServer, offset: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    #[test]
    fn test_page_task_url_carries_keyword_and_offset() {
        let site = LineSite {
            endpoint: "https://search.example/s".to_string(),
            batch: 10,
            total: UNBOUNDED_TOTAL,
            count_calls: AtomicUsize::new(0),
        };
        let engine = engine(site);
        let query = engine.build_query("red panda", &[SearchOption::Latest]);
        let task = engine.page_task(&query, 20);
        assert_eq!(task.offset, 20);
        assert_eq!(
            task.url,
            "https://search.example/s?format=lines&q=red+panda&latest=1&offset=20"
        );
    }

    #[tokio::test]
    async fn test_search_zero_count_sends_nothing() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let engine = engine(LineSite::new(&server, 5));
        assert!(engine.search("cat", 0, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_dedups_filters_and_caps() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        mount_page(
            &server,
            "0",
            "https://a.example/1.jpg\nhttps://blocked.example/2.jpg\nhttps://a.example/1.jpg",
        )
        .await;
        mount_page(
            &server,
            "3",
            "https://cdn.blocked.example/3.jpg\nhttps://a.example/4.jpg\nhttps://a.example/5.jpg",
        )
        .await;

        let engine = engine(LineSite::new(&server, 3));
        let mut urls = engine.search("cat", 4, &[]).await.unwrap();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://a.example/1.jpg".to_string(),
                "https://a.example/4.jpg".to_string(),
                "https://a.example/5.jpg".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_stops_at_target_count() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        let body: Vec<String> = (0..5).map(|i| format!("https://a.example/{i}.jpg")).collect();
        mount_page(&server, "0", &body.join("\n")).await;

        let engine = engine(LineSite::new(&server, 5));
        let urls = engine.search("cat", 2, &[]).await.unwrap();
        assert_eq!(urls.len(), 2);
        let unique: HashSet<_> = urls.iter().collect();
        assert_eq!(unique.len(), 2);
    }

    #[tokio::test]
    async fn test_search_huge_count_dispatches_lazily() {
        let site = LineSite {
            endpoint: "http://127.0.0.1:9/search".to_string(),
            batch: 10,
            total: UNBOUNDED_TOTAL,
            count_calls: AtomicUsize::new(0),
        };
        let engine = engine(site);
        let (result, ()) = tokio::join!(engine.search("cat", usize::MAX, &[]), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            engine.shutdown();
        });
        assert!(
            matches!(result, Err(SearchError::Pool(PoolError::Closed))),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn test_failed_pages_do_not_fail_search() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        mount_page(&server, "0", "https://a.example/1.jpg").await;
        Mock::given(method("GET"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let engine = engine(LineSite::new(&server, 2));
        let urls = engine.search("cat", 4, &[]).await.unwrap();
        assert_eq!(urls, vec!["https://a.example/1.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_original_falls_back() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        let body = format!(
            "{0}/gone.jpg|{0}/thumb-a\n{0}/alive.jpg|{0}/thumb-b",
            server.uri()
        );
        mount_page(&server, "0", &body).await;
        Mock::given(method("GET"))
            .and(path("/alive.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let engine = engine(LineSite::new(&server, 10));
        let mut urls = engine.search("cat", 10, &[]).await.unwrap();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                format!("{}/alive.jpg", server.uri()),
                format!("{}/thumb-a", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn test_range_search_stops_on_empty_unbounded_page() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        mount_page(&server, "0", "https://a.example/1.jpg\nhttps://a.example/1.jpg").await;
        mount_page(&server, "2", "https://blocked.example/x.jpg\nhttps://a.example/2.jpg").await;
        mount_page(&server, "4", "").await;

        let engine = engine(LineSite::new(&server, 2));
        let mut pages = Vec::new();
        engine
            .range_search(
                "cat",
                &mut |page| {
                    pages.push(page);
                    true
                },
                &[],
            )
            .await
            .unwrap();

        assert_eq!(
            pages,
            vec![
                vec!["https://a.example/1.jpg".to_string()],
                vec!["https://a.example/2.jpg".to_string()],
                Vec::new(),
            ]
        );
    }

    #[tokio::test]
    async fn test_range_search_respects_callback_and_memoises_total() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        mount_page(&server, "0", "https://a.example/1.jpg").await;
        mount_page(&server, "1", "https://a.example/2.jpg").await;

        let mut site = LineSite::new(&server, 1);
        site.total = 5;
        let engine = engine(site);

        for _ in 0..2 {
            let mut calls = 0;
            engine
                .range_search(
                    "cat",
                    &mut |_| {
                        calls += 1;
                        calls < 2
                    },
                    &[],
                )
                .await
                .unwrap();
            assert_eq!(calls, 2);
        }
        assert_eq!(engine.site().count_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_range_search_with_zero_total_fetches_nothing() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        let mut site = LineSite::new(&server, 3);
        site.total = 0;
        let engine = engine(site);
        let mut calls = 0;
        engine
            .range_search(
                "cat",
                &mut |_| {
                    calls += 1;
                    true
                },
                &[],
            )
            .await
            .unwrap();
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_further_searches() {
        let Some(server) = start_mock_server().await else {
            return;
        };
        let engine = engine(LineSite::new(&server, 3));
        engine.shutdown();
        let result = engine.search("cat", 3, &[]).await;
        assert!(matches!(result, Err(SearchError::Pool(PoolError::Closed))));
    }

    #[test]
    fn test_invalid_concurrency_rejected() {
        let site = LineSite {
            endpoint: "https://search.example/s".to_string(),
            batch: 10,
            total: UNBOUNDED_TOTAL,
            count_calls: AtomicUsize::new(0),
        };
        let config = CaptureConfig {
            concurrency: 500,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            SearchEngine::new(site, config),
            Err(SearchError::Pool(PoolError::InvalidSize { value: 500 }))
        ));
    }
}
