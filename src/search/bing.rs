//! Bing image search.
//!
//! The `images/async` endpoint returns an HTML fragment. Every result is an
//! `a.iusc` anchor whose `m` attribute holds JSON with the original image
//! URL (`murl`) and a Bing-hosted thumbnail (`turl`). Originals are often
//! dead, so each result is probed and the thumbnail used when the original
//! does not answer.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;

use super::engine::SearchEngine;
use super::query::{ImageSize, Query, SearchOption};
use super::site::{Candidate, Site};
use crate::user_agent;

const SEARCH_ENDPOINT: &str = "https://cn.bing.com/images/async";

/// Results per page request.
const BATCH_SIZE: usize = 35;

const BASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameter holding the `+`-joined filter tokens.
const FILTER_PARAM: &str = "qft";

#[allow(clippy::expect_used)]
static RESULT_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.iusc").expect("anchor selector is valid"));

#[derive(Debug, Deserialize)]
struct ResultMetadata {
    #[serde(default)]
    murl: String,
    #[serde(default)]
    turl: String,
}

/// Bing search backend.
#[derive(Debug, Clone)]
pub struct BingSite {
    endpoint: String,
}

/// Search engine over Bing.
pub type BingCapture = SearchEngine<BingSite>;

impl Default for BingSite {
    fn default() -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }
}

impl BingSite {
    /// Backend against the public Bing endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend against a custom endpoint.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Site for BingSite {
    fn name(&self) -> &'static str {
        "bing"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent::MAC_CHROME));
        headers
    }

    fn base_query(&self) -> Query {
        Query::new()
            .with("scenario", "ImageBasicHover")
            .with("datsrc", "N_I")
            .with("ch", "918")
            .with("layout", "ColumnBased")
            .with("mmasync", "1")
            .with("count", "30")
    }

    fn keyword_param(&self) -> &'static str {
        "q"
    }

    fn offset_param(&self) -> &'static str {
        "first"
    }

    fn apply_option(&self, query: &mut Query, option: SearchOption) {
        let token = match option {
            SearchOption::Size(size) => match size {
                ImageSize::Small => "filterui:imagesize-small",
                ImageSize::Medium => "filterui:imagesize-medium",
                ImageSize::Large => "filterui:imagesize-large",
                ImageSize::Enormous => "filterui:imagesize-wallpaper",
            },
            SearchOption::Animated => "filterui:photo-animatedgif",
            SearchOption::Latest => "filterui:age-lt1440",
            SearchOption::HighDefinition | SearchOption::Copyright => {
                debug!(?option, "option not supported by bing, ignored");
                return;
            }
        };
        let filters = add_filter(query.get(FILTER_PARAM).unwrap_or_default(), token);
        query.set(FILTER_PARAM, filters);
    }

    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    fn base_timeout(&self) -> Duration {
        BASE_TIMEOUT
    }

    fn extract(&self, body: &str) -> Vec<Candidate> {
        let document = Html::parse_fragment(body);
        document
            .select(&RESULT_ANCHOR)
            .filter_map(|anchor| anchor.value().attr("m"))
            .filter_map(|raw| match serde_json::from_str::<ResultMetadata>(raw) {
                Ok(metadata) => Some(metadata),
                Err(error) => {
                    debug!(%error, "skipping result with unreadable metadata");
                    None
                }
            })
            .filter_map(|metadata| match (metadata.murl.is_empty(), metadata.turl.is_empty()) {
                (false, false) => Some(Candidate::with_fallback(metadata.murl, metadata.turl)),
                (false, true) => Some(Candidate::direct(metadata.murl)),
                (true, false) => Some(Candidate::direct(metadata.turl)),
                (true, true) => None,
            })
            .collect()
    }
}

/// Adds `token` to a `+`-joined filter list. A token of the same group (the
/// part before the last `-`) is replaced where it stands.
fn add_filter(existing: &str, token: &str) -> String {
    let group = filter_group(token);
    let mut tokens: Vec<&str> = existing.split('+').filter(|t| !t.is_empty()).collect();
    match tokens.iter_mut().find(|current| filter_group(current) == group) {
        Some(slot) => *slot = token,
        None => tokens.push(token),
    }
    tokens.iter().map(|current| format!("+{current}")).collect()
}

fn filter_group(token: &str) -> &str {
    token.rsplit_once('-').map_or(token, |(group, _)| group)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <div class="imgpt">
          <a class="iusc" m='{"murl":"https://origin.example/a.jpg","turl":"https://tse.example/th?id=a"}' href="#">a</a>
        </div>
        <div class="imgpt">
          <a class="iusc" m='{"murl":"","turl":"https://tse.example/th?id=b"}'>b</a>
          <a class="other" m='{"murl":"https://origin.example/ignored.jpg"}'>c</a>
          <a class="iusc" m='not json'>d</a>
        </div>"##;

    #[test]
    fn test_extract_result_anchors() {
        let candidates = BingSite::new().extract(PAGE);
        assert_eq!(
            candidates,
            vec![
                Candidate::with_fallback("https://origin.example/a.jpg", "https://tse.example/th?id=a"),
                Candidate::direct("https://tse.example/th?id=b"),
            ]
        );
    }

    #[test]
    fn test_base_query_parameters() {
        let site = BingSite::new();
        let query = site.base_query();
        assert_eq!(query.get("mmasync"), Some("1"));
        assert_eq!(query.get("layout"), Some("ColumnBased"));
        assert_eq!(site.keyword_param(), "q");
        assert_eq!(site.offset_param(), "first");
    }

    #[test]
    fn test_options_become_filter_tokens() {
        let site = BingSite::new();
        let mut query = site.base_query();
        site.apply_option(&mut query, SearchOption::Size(ImageSize::Small));
        site.apply_option(&mut query, SearchOption::Animated);
        site.apply_option(&mut query, SearchOption::Size(ImageSize::Large));
        site.apply_option(&mut query, SearchOption::Animated);
        assert_eq!(
            query.get(FILTER_PARAM),
            Some("+filterui:imagesize-large+filterui:photo-animatedgif")
        );
    }

    #[test]
    fn test_replaced_filter_keeps_its_position() {
        assert_eq!(
            add_filter("+filterui:photo-animatedgif+filterui:imagesize-small", "filterui:photo-animatedgif"),
            "+filterui:photo-animatedgif+filterui:imagesize-small"
        );
        assert_eq!(
            add_filter("+filterui:imagesize-small+filterui:age-lt1440", "filterui:imagesize-wallpaper"),
            "+filterui:imagesize-wallpaper+filterui:age-lt1440"
        );
        assert_eq!(add_filter("", "filterui:age-lt1440"), "+filterui:age-lt1440");
    }

    #[test]
    fn test_unsupported_options_are_ignored() {
        let site = BingSite::new();
        let mut query = site.base_query();
        site.apply_option(&mut query, SearchOption::HighDefinition);
        site.apply_option(&mut query, SearchOption::Copyright);
        assert_eq!(query, site.base_query());
    }
}
