//! Baidu image search.
//!
//! Result pages come from the `flip` endpoint; image URLs are embedded in the
//! page script as `"objURL":"…"` fields and pulled out with a regex. Baidu
//! also exposes a JSON endpoint reporting how many results a query has, which
//! bounds range searches.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use tracing::debug;

use super::engine::SearchEngine;
use super::error::SearchError;
use super::query::{Query, SearchOption};
use super::site::{Candidate, Site};
use crate::download::{DownloadError, send_checked};
use crate::user_agent;

const SEARCH_ENDPOINT: &str = "https://image.baidu.com/search/flip";
const COUNT_ENDPOINT: &str = "https://image.baidu.com/search/acjson";
const REFERER_URL: &str = "https://image.baidu.com/";
const ACCEPT_VALUE: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Results per `flip` page.
const BATCH_SIZE: usize = 60;

const BASE_TIMEOUT: Duration = Duration::from_secs(3);

#[allow(clippy::expect_used)]
static OBJ_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""objURL":"(.*?)","#).expect("objURL regex is valid") // Static pattern, safe to panic
});

/// Baidu search backend.
#[derive(Debug, Clone)]
pub struct BaiduSite {
    endpoint: String,
    count_endpoint: String,
}

/// Search engine over Baidu.
pub type BaiduCapture = SearchEngine<BaiduSite>;

impl Default for BaiduSite {
    fn default() -> Self {
        Self::with_endpoints(SEARCH_ENDPOINT, COUNT_ENDPOINT)
    }
}

impl BaiduSite {
    /// Backend against the public Baidu endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend against custom result-page and count endpoints.
    #[must_use]
    pub fn with_endpoints(endpoint: impl Into<String>, count_endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            count_endpoint: count_endpoint.into(),
        }
    }
}

#[async_trait]
impl Site for BaiduSite {
    fn name(&self) -> &'static str {
        "baidu"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent::WINDOWS_CHROME));
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
        headers
    }

    fn base_query(&self) -> Query {
        Query::new()
            .with("tn", "baiduimage")
            .with("ipn", "rj")
            .with("ct", "201326592")
            .with("lm", "-1")
            .with("fp", "result")
            .with("ie", "utf-8")
            .with("oe", "utf-8")
            .with("st", "-1")
            .with("pn", "0")
            .with("rn", BATCH_SIZE.to_string())
            .with("hd", "")
            .with("latest", "")
            .with("z", "")
            .with("face", "")
            .with("copyright", "")
    }

    fn keyword_param(&self) -> &'static str {
        "word"
    }

    fn offset_param(&self) -> &'static str {
        "pn"
    }

    fn apply_option(&self, query: &mut Query, option: SearchOption) {
        match option {
            SearchOption::Size(size) => query.set("z", size.code().to_string()),
            SearchOption::Latest => query.set("latest", "1"),
            SearchOption::Animated => query.set("lm", "6"),
            SearchOption::HighDefinition => query.set("hd", "1"),
            SearchOption::Copyright => query.set("copyright", "1"),
        };
    }

    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    fn base_timeout(&self) -> Duration {
        BASE_TIMEOUT
    }

    fn extract(&self, body: &str) -> Vec<Candidate> {
        OBJ_URL
            .captures_iter(body)
            .filter_map(|captures| captures.get(1))
            .map(|found| found.as_str())
            .filter(|url| !url.is_empty())
            .map(Candidate::direct)
            .collect()
    }

    async fn total_count(&self, client: &Client, query: &Query) -> Result<usize, SearchError> {
        let mut count_query = query.clone();
        count_query.set("tn", "resultjson_com");
        let url = format!("{}?{}", self.count_endpoint, count_query.encode());

        let response = send_checked(&url, client.get(&url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::transport(&url, e))?;
        let total = parse_total(&url, &body)?;
        debug!(total, "baidu reported result count");
        Ok(total)
    }
}

/// Reads `listNum` from the count endpoint's quasi-JSON body.
///
/// The body uses single-quoted strings, so quotes are normalised before
/// parsing. A body without `listNum` counts as zero results.
fn parse_total(url: &str, body: &str) -> Result<usize, SearchError> {
    let normalised = body.replace('\'', "\"");
    let value: serde_json::Value = serde_json::from_str(&normalised)
        .map_err(|e| SearchError::total_count(url, e.to_string()))?;

    let Some(list_num) = value.get("listNum") else {
        return Ok(0);
    };
    list_num
        .as_u64()
        .and_then(|total| usize::try_from(total).ok())
        .ok_or_else(|| SearchError::total_count(url, format!("listNum is not a count: {list_num}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::search::ImageSize;

    #[test]
    fn test_extract_obj_urls() {
        let body = r#"{"thumbURL":"https://t.example/1.jpg","objURL":"https://img.example/a.jpg","fromURL":"x"},
            {"objURL":"https://img.example/b.png","fromURL":"y"}, {"objURL":"","fromURL":"z"}"#;
        let candidates = BaiduSite::new().extract(body);
        assert_eq!(
            candidates,
            vec![
                Candidate::direct("https://img.example/a.jpg"),
                Candidate::direct("https://img.example/b.png"),
            ]
        );
    }

    #[test]
    fn test_extract_from_page_without_results() {
        assert!(BaiduSite::new().extract("<html>no results</html>").is_empty());
    }

    #[test]
    fn test_base_query_parameters() {
        let site = BaiduSite::new();
        let query = site.base_query();
        assert_eq!(query.get("tn"), Some("baiduimage"));
        assert_eq!(query.get("rn"), Some("60"));
        assert_eq!(query.get("lm"), Some("-1"));
        assert_eq!(query.get("hd"), Some(""));
        assert_eq!(site.keyword_param(), "word");
        assert_eq!(site.offset_param(), "pn");
    }

    #[test]
    fn test_options_map_to_parameters() {
        let site = BaiduSite::new();
        let mut query = site.base_query();
        for option in [
            SearchOption::Size(ImageSize::Small),
            SearchOption::Size(ImageSize::Enormous),
            SearchOption::Latest,
            SearchOption::Animated,
            SearchOption::HighDefinition,
            SearchOption::Copyright,
        ] {
            site.apply_option(&mut query, option);
        }
        assert_eq!(query.get("z"), Some("9"));
        assert_eq!(query.get("latest"), Some("1"));
        assert_eq!(query.get("lm"), Some("6"));
        assert_eq!(query.get("hd"), Some("1"));
        assert_eq!(query.get("copyright"), Some("1"));
    }

    #[test]
    fn test_parse_total_single_quoted_body() {
        let body = "{'queryEnc':'cat','listNum':1234,'bdIsClustered':'1'}";
        assert_eq!(parse_total("u", body).unwrap(), 1234);
    }

    #[test]
    fn test_parse_total_missing_count_is_zero() {
        assert_eq!(parse_total("u", "{'queryEnc':'cat'}").unwrap(), 0);
    }

    #[test]
    fn test_parse_total_rejects_bad_bodies() {
        assert!(matches!(
            parse_total("u", "<html>"),
            Err(SearchError::TotalCount { .. })
        ));
        assert!(matches!(
            parse_total("u", "{'listNum':'many'}"),
            Err(SearchError::TotalCount { .. })
        ));
    }
}
