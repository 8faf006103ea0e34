//! Entry timestamps and filename encoding
//!
//! An entry's freshness lives in the filesystem rather than in its metadata:
//! the content file's last-write time is its freshness deadline and the
//! last-modified instant is encoded into the filename. Deciding whether an
//! entry is fresh therefore costs one `stat` and no JSON parsing.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::header::{ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, Request};

use super::http_date::{self, parse_http_date};
use super::validator::Validator;
use crate::error::{self, Result};
use crate::http::cache_control::CacheControl;

/// Last-write time of a content file whose freshness window is unknown.
///
/// Every real instant compares greater, so such entries always revalidate.
pub const NO_EXPIRY: SystemTime = UNIX_EPOCH;

/// Extension of the content blob
pub const CONTENT_EXTENSION: &str = "bin";
/// Extension of the metadata sidecar
pub const META_EXTENSION: &str = "json";
/// Extension of uncommitted or purging files
pub const TEMP_EXTENSION: &str = "tmp";

/// Longest validator path form kept in an entry name.
///
/// Leaves room for the fingerprint, a 20-digit timestamp and the longest
/// suffix (`.{016x}.tmp` while purging) within a 255-byte filename. Longer
/// validators are only kept in the metadata sidecar.
pub const MAX_VALIDATOR_PATH_LEN: usize = 128;

/// Last-modified instant and freshness deadline of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryTimestamp {
    pub last_modified: Option<SystemTime>,
    pub expiry: Option<SystemTime>,
}

impl EntryTimestamp {
    /// Derive the timestamp pair from response headers.
    ///
    /// `Expires` takes precedence over `Cache-Control: max-age`, which is
    /// resolved relative to `now`.
    #[must_use]
    pub fn from_response(headers: &HeaderMap, now: SystemTime) -> Self {
        let last_modified = header_date(headers, LAST_MODIFIED.as_str());
        let expiry = header_date(headers, EXPIRES.as_str()).or_else(|| {
            CacheControl::from_headers(headers)
                .max_age
                .and_then(|max_age| now.checked_add(max_age))
        });

        Self {
            last_modified,
            expiry,
        }
    }

    /// Decode the timestamp pair of a committed content file without opening it.
    pub fn from_stored_entry(path: &Path) -> Result<Self> {
        let name = EntryName::from_path(path).ok_or_else(|| {
            error::invalid_state(format!("{} is not a cache entry", path.display()))
        })?;
        let modified = std::fs::metadata(path)?.modified()?;

        Ok(Self {
            last_modified: name.last_modified(),
            expiry: (modified != NO_EXPIRY).then_some(modified),
        })
    }

    #[must_use]
    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|expiry| expiry > now)
    }

    /// Deadline persisted as the content file's last-write time
    #[must_use]
    pub fn stored_expiry(&self) -> SystemTime {
        self.expiry.unwrap_or(NO_EXPIRY)
    }

    /// Set `If-Modified-Since` and `If-None-Match` from what is known about the entry.
    pub fn apply_conditional_headers<B>(
        &self,
        request: &mut Request<B>,
        validator: &Validator,
    ) -> Result<()> {
        let headers = request.headers_mut();

        if let Some(last_modified) = self.last_modified {
            let value = HeaderValue::from_str(&http_date::fmt_http_date(last_modified))
                .map_err(error::invalid_state)?;
            headers.insert(IF_MODIFIED_SINCE, value);
        }

        if !validator.is_empty() {
            let value =
                HeaderValue::from_str(&validator.wire_form()?).map_err(error::invalid_state)?;
            headers.insert(IF_NONE_MATCH, value);
        }

        Ok(())
    }

    /// Canonical name of the entry this timestamp would be committed under.
    ///
    /// Without a known last-modified instant the commit time stands in. A
    /// validator whose path form exceeds [`MAX_VALIDATOR_PATH_LEN`] is left
    /// out of the name.
    #[must_use]
    pub fn entry_name(&self, fingerprint: &str, validator: &Validator, now: SystemTime) -> EntryName {
        let validator = if validator.path_form().len() > MAX_VALIDATOR_PATH_LEN {
            tracing::debug!(
                target: "hcache::cache::timestamp",
                validator = %validator,
                "Validator too long for an entry name, keeping it in metadata only"
            );
            Validator::EMPTY
        } else {
            validator.clone()
        };

        EntryName {
            fingerprint: fingerprint.to_string(),
            timestamp: http_date::unix_seconds(self.last_modified.unwrap_or(now)),
            validator,
        }
    }
}

/// Validator carried by response headers
#[must_use]
pub fn response_validator(headers: &HeaderMap) -> Validator {
    Validator::from_header_value(headers.get(ETAG).and_then(|v| v.to_str().ok()))
}

fn header_date(headers: &HeaderMap, name: &str) -> Option<SystemTime> {
    let raw = headers.get(name)?.to_str().ok()?;
    match parse_http_date(raw) {
        Ok(date) => Some(date),
        Err(err) => {
            tracing::debug!(
                target: "hcache::cache::timestamp",
                header = name,
                error = %err,
                "Ignoring unparseable date header"
            );
            None
        }
    }
}

/// `{fingerprint}_{timestamp}_{validator}` stem shared by both files of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    pub fingerprint: String,
    /// Whole seconds since the Unix epoch; `0` means unknown
    pub timestamp: u64,
    pub validator: Validator,
}

impl EntryName {
    #[must_use]
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.fingerprint,
            self.timestamp,
            self.validator.path_form()
        )
    }

    #[must_use]
    pub fn content_file_name(&self) -> String {
        format!("{}.{CONTENT_EXTENSION}", self.stem())
    }

    #[must_use]
    pub fn meta_file_name(&self) -> String {
        format!("{}.{META_EXTENSION}", self.stem())
    }

    /// Inverse of [`EntryName::stem`].
    #[must_use]
    pub fn parse(stem: &str) -> Option<Self> {
        let mut parts = stem.splitn(3, '_');
        let fingerprint = parts.next()?;
        let timestamp = parts.next()?.parse::<u64>().ok()?;
        let validator = parts.next()?;

        if !super::fingerprint::is_fingerprint(fingerprint) {
            return None;
        }

        Some(Self {
            fingerprint: fingerprint.to_string(),
            timestamp,
            validator: Validator::from_path_form(validator),
        })
    }

    /// Decode the name of a content or metadata file.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name
            .strip_suffix(CONTENT_EXTENSION)
            .or_else(|| file_name.strip_suffix(META_EXTENSION))?
            .strip_suffix('.')?;
        Self::parse(stem)
    }

    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        (self.timestamp != 0).then(|| UNIX_EPOCH + Duration::from_secs(self.timestamp))
    }
}
