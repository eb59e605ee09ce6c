//! URL classification used by the auto-grouping rules.

use url::Url;

/// Schemes that never take part in auto-grouping.
const INTERNAL_SCHEMES: &[&str] = &[
    "about",
    "blob",
    "browser",
    "chrome",
    "chrome-extension",
    "data",
    "edge",
    "file",
    "internal",
    "javascript",
    "moz-extension",
    "view-source",
];

/// Comparable site of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Lowercased host with a leading `www.` removed.
    Known(String),
    /// Unparsable URL or URL without a host.
    Unknown,
}

impl Domain {
    /// Extracts the domain of `raw`.
    pub fn of(raw: &str) -> Domain {
        let Ok(url) = Url::parse(raw.trim()) else {
            return Domain::Unknown;
        };
        match url.host_str() {
            Some(host) if !host.is_empty() => {
                let host = host.strip_prefix("www.").unwrap_or(host);
                Domain::Known(host.trim_end_matches('.').to_string())
            }
            _ => Domain::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Domain::Unknown)
    }
}

/// Returns `true` for browser-internal pages such as `about:blank` or
/// `chrome://settings`. Unparsable input is not internal; it is handled as
/// an unknown domain instead.
pub fn is_internal_url(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => url.cannot_be_a_base() || INTERNAL_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}
