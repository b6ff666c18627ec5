//! Browser User-Agent strings.
//!
//! Image search endpoints serve reduced or empty result pages to clients that
//! do not look like a desktop browser, so every request carries one of these.

/// Chrome on Windows, used for Baidu.
pub(crate) const WINDOWS_CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/84.0.4147.125 Safari/537.36";

/// Chrome on macOS, used for Bing and standalone downloads.
pub(crate) const MAC_CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// User-Agent sent by a downloader built without explicit headers.
#[must_use]
pub(crate) fn default_download_user_agent() -> &'static str {
    MAC_CHROME
}
