//! Source-domain exclusion rules for collected image URLs.
//!
//! A [`Rule`] is a named group of host suffixes; a [`RuleSet`] is an ordered
//! list of rules. Evaluation is a pure predicate: URLs that cannot be parsed
//! never match (fail-open), so callers decide what to do with them.
//!
//! # Example
//!
//! ```
//! use imagecapture_core::filter::{Rule, RuleSet};
//!
//! let rules = RuleSet::default();
//! assert!(rules.check("https://p3.douyinpic.com/img/abc.jpeg"));
//! assert!(!rules.check("https://example.com/cat.png"));
//!
//! let custom = RuleSet::new(vec![Rule::new("stock", ["shutterstock.com"])]);
//! assert!(custom.check("https://image.shutterstock.com/x.jpg"));
//! ```

use url::Url;

/// Short-video platform hosts whose image URLs are hotlink-protected.
const DOUYIN_SUFFIXES: &[&str] = &[
    "douyin.com",
    "douyinpic.com",
    "ixigua.com",
    "snssdk.com",
    "amemv.com",
    "tiktok.com",
];

/// Sina image hosts (referer-protected).
const SINA_SUFFIXES: &[&str] = &["sinaimg.cn", "sinajs.cn", "sina.com.cn", "vip.sina.com"];

/// A named group of host suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    name: String,
    suffixes: Vec<String>,
}

impl Rule {
    /// Creates a rule from a name and a list of host suffixes.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            suffixes: suffixes
                .into_iter()
                .map(|suffix| suffix.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Douyin / TikTok family of hosts.
    #[must_use]
    pub fn douyin() -> Self {
        Self::new("douyin", DOUYIN_SUFFIXES.iter().copied())
    }

    /// Sina image hosts.
    #[must_use]
    pub fn sina() -> Self {
        Self::new("sina", SINA_SUFFIXES.iter().copied())
    }

    /// Rule name, used for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host suffixes in this group.
    #[must_use]
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Returns true if the URL's host ends with any suffix of this rule.
    ///
    /// Unparsable URLs and URLs without a host return false.
    #[must_use]
    pub fn check(&self, raw_url: &str) -> bool {
        host_of(raw_url).is_some_and(|host| self.matches_host(&host))
    }

    fn matches_host(&self, host: &str) -> bool {
        self.suffixes.iter().any(|suffix| host.ends_with(suffix.as_str()))
    }
}

/// Ordered collection of exclusion rules.
///
/// Pure data: cloning is cheap enough for per-engine injection and checks
/// never mutate anything, so a shared `RuleSet` is safe to use from many tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    /// Douyin and Sina sources are excluded by default.
    fn default() -> Self {
        Self::new(vec![Rule::douyin(), Rule::sina()])
    }
}

impl RuleSet {
    /// Creates a rule set from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// A rule set that matches nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends another rule group, returning the extended set.
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns true if any rule matches the URL.
    #[must_use]
    pub fn check(&self, raw_url: &str) -> bool {
        self.matching_rule(raw_url).is_some()
    }

    /// Returns the first rule matching the URL, if any.
    #[must_use]
    pub fn matching_rule(&self, raw_url: &str) -> Option<&Rule> {
        let host = host_of(raw_url)?;
        self.rules.iter().find(|rule| rule.matches_host(&host))
    }
}

fn host_of(raw_url: &str) -> Option<String> {
    let parsed = Url::parse(raw_url).ok()?;
    parsed.host_str().map(str::to_ascii_lowercase)
}
