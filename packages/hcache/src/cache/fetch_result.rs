//! Result of a cache fetch
//!
//! A fetch is answered either by a committed entry on disk or by a live
//! response that was not persisted. `FetchResult` reads both the same way.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::{HeaderValue, Response};
use tokio::io::AsyncRead;

use super::metadata::MetadataRecord;
use crate::error::Result;

/// Header carrying the cache outcome of a proxied request
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";
/// Request header overriding the stale-if-error policy for one request
pub const STALE_IF_ERROR_HEADER: &str = "x-cache-stale-if-error";

/// How a fetch was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    /// Fresh stored entry, no network call
    Hit,
    /// Fetched from the origin and committed
    Stored,
    /// Stale stored entry confirmed by the origin
    Revalidate,
    /// Fetched from the origin and not persisted
    NoCache,
    /// Stale stored entry served because the origin failed
    UseStaleDueToError,
}

impl CacheStatus {
    /// Value of [`CACHE_STATUS_HEADER`] for this outcome
    #[must_use]
    pub fn header_value(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stored => "miss",
            Self::Revalidate => "revalidate",
            Self::NoCache => "no-store",
            Self::UseStaleDueToError => "stale",
        }
    }

    /// True when the answer came from disk
    #[must_use]
    pub fn is_from_cache(self) -> bool {
        matches!(self, Self::Hit | Self::Revalidate | Self::UseStaleDueToError)
    }
}

/// Per-request stale-if-error override carried by [`STALE_IF_ERROR_HEADER`].
///
/// Accepts `true`/`false`/`1`/`0`; anything else is no override.
#[must_use]
pub fn stale_if_error_override(headers: &http::HeaderMap) -> Option<bool> {
    let value = headers.get(STALE_IF_ERROR_HEADER)?.to_str().ok()?.trim();
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        None
    }
}

/// A fetched resource, stored or live
#[derive(Debug)]
pub enum FetchResult {
    Stored {
        content_path: PathBuf,
        meta_path: PathBuf,
        status: CacheStatus,
    },
    Live {
        response: Response<Bytes>,
        status: CacheStatus,
    },
}

impl FetchResult {
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::Stored { status, .. } | Self::Live { status, .. } => *status,
        }
    }

    /// Path of the committed content file, if the result is stored
    #[must_use]
    pub fn content_path(&self) -> Option<&Path> {
        match self {
            Self::Stored { content_path, .. } => Some(content_path),
            Self::Live { .. } => None,
        }
    }

    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    /// Stored or live response envelope, without the body
    pub async fn metadata(&self) -> Result<MetadataRecord> {
        match self {
            Self::Stored { meta_path, .. } => MetadataRecord::read(meta_path).await,
            Self::Live { response, .. } => Ok(MetadataRecord::from_response(None, response)),
        }
    }

    pub async fn bytes(self) -> Result<Bytes> {
        match self {
            Self::Stored { content_path, .. } => Ok(tokio::fs::read(content_path).await?.into()),
            Self::Live { response, .. } => Ok(response.into_body()),
        }
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Body as a reader; stored entries are streamed from disk
    pub async fn into_reader(self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match self {
            Self::Stored { content_path, .. } => {
                Ok(Box::new(tokio::fs::File::open(content_path).await?))
            }
            Self::Live { response, .. } => Ok(Box::new(Cursor::new(response.into_body()))),
        }
    }

    /// Write the body to `destination`, returning the number of bytes written
    pub async fn copy_to(self, destination: &Path) -> Result<u64> {
        match self {
            Self::Stored { content_path, .. } => {
                Ok(tokio::fs::copy(content_path, destination).await?)
            }
            Self::Live { response, .. } => {
                let body = response.into_body();
                tokio::fs::write(destination, &body).await?;
                Ok(body.len() as u64)
            }
        }
    }

    /// Full response; stored entries are rebuilt from their metadata.
    ///
    /// The cache status is attached both as a response extension and as the
    /// [`CACHE_STATUS_HEADER`] header.
    pub async fn into_response(self) -> Result<Response<Bytes>> {
        let status = self.status();
        let mut response = match self {
            Self::Stored {
                content_path,
                meta_path,
                ..
            } => {
                let record = MetadataRecord::read(&meta_path).await?;
                let body = tokio::fs::read(content_path).await?;
                let mut response = Response::new(Bytes::from(body));
                record.apply_to(&mut response);
                response
            }
            Self::Live { response, .. } => response,
        };

        response.extensions_mut().insert(status);
        response.headers_mut().insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(status.header_value()),
        );
        Ok(response)
    }
}
