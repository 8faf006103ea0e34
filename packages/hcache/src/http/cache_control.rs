//! `Cache-Control` directive parsing
//!
//! Only the directives that drive freshness and classification are modeled.

use std::time::Duration;

use http::HeaderMap;
use http::header::{CACHE_CONTROL, PRAGMA};

/// Parsed cache directives of a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<Duration>,
}

impl CacheControl {
    /// Parse every `Cache-Control` header in `headers`.
    ///
    /// `Pragma: no-cache` is honored only when no `Cache-Control` header is present.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut directives = Self::default();
        let mut seen_cache_control = false;

        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else {
                tracing::debug!(
                    target: "hcache::http::cache_control",
                    "Ignoring non-ASCII Cache-Control header"
                );
                continue;
            };
            seen_cache_control = true;
            directives.merge(value);
        }

        if !seen_cache_control
            && headers
                .get_all(PRAGMA)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|v| v.to_ascii_lowercase().contains("no-cache"))
        {
            directives.no_cache = true;
        }

        directives
    }

    fn merge(&mut self, value: &str) {
        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive, None),
            };

            if name.eq_ignore_ascii_case("no-cache") {
                self.no_cache = true;
            } else if name.eq_ignore_ascii_case("no-store") {
                self.no_store = true;
            } else if name.eq_ignore_ascii_case("max-age")
                && let Some(seconds) = argument.and_then(|a| a.parse::<u64>().ok())
            {
                // The first max-age wins when a response repeats it
                if self.max_age.is_none() {
                    self.max_age = Some(Duration::from_secs(seconds));
                }
            }
        }
    }
}
