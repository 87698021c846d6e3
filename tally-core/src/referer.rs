//! Referer domain extraction.

use url::Url;

/// Host part of an absolute referer URL, or an empty string.
pub fn domain(referer: &str) -> String {
    let referer = referer.trim();
    if referer.is_empty() {
        return String::new();
    }
    Url::parse(referer)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}
