//! Ordered query-string bag and search options.

use url::form_urlencoded;

/// Insertion-ordered key/value parameters for one search request.
///
/// Setting an existing key replaces its value in place, so the encoded
/// parameter order stays stable however many options are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.pairs.iter_mut().find(|(existing, _)| existing == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
        self
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// `application/x-www-form-urlencoded` rendering.
    #[must_use]
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Result image size class. Discriminants are Baidu's `z` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSize {
    Small = 1,
    Medium = 2,
    Large = 3,
    Enormous = 9,
}

impl ImageSize {
    /// Numeric size code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Named search toggles. Each site maps them onto its own parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchOption {
    /// Restrict to a size class.
    Size(ImageSize),
    /// Only recent images.
    Latest,
    /// Only animated images.
    Animated,
    /// Only high-definition images.
    HighDefinition,
    /// Only images flagged as free of copyright restrictions.
    Copyright,
}
