//! Metadata sidecar persisted next to every content blob
//!
//! Holds enough of the response envelope (status, response headers, content
//! headers, trailers) to rebuild a full `http::Response` from disk.

use std::collections::BTreeMap;
use std::path::Path;

use http::header::{ALLOW, EXPIRES, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::transport::Trailers;

/// Header name to values, values kept in arrival order
pub type HeaderList = BTreeMap<String, Vec<String>>;

/// Serializable snapshot of a response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub response_headers: HeaderList,
    #[serde(default)]
    pub content_headers: HeaderList,
    #[serde(default)]
    pub trailing_headers: HeaderList,
}

fn default_status() -> u16 {
    StatusCode::OK.as_u16()
}

impl Default for MetadataRecord {
    fn default() -> Self {
        Self {
            source_uri: None,
            status: default_status(),
            response_headers: HeaderList::new(),
            content_headers: HeaderList::new(),
            trailing_headers: HeaderList::new(),
        }
    }
}

impl MetadataRecord {
    /// Snapshot a response, splitting content headers from the rest.
    #[must_use]
    pub fn from_response<B>(source_uri: Option<&str>, response: &Response<B>) -> Self {
        let mut record = Self {
            source_uri: source_uri.map(str::to_string),
            status: response.status().as_u16(),
            ..Self::default()
        };

        for (name, value) in response.headers() {
            let target = if is_content_header(name) {
                &mut record.content_headers
            } else {
                &mut record.response_headers
            };
            push_value(target, name, value);
        }

        if let Some(Trailers(trailers)) = response.extensions().get::<Trailers>() {
            for (name, value) in trailers {
                push_value(&mut record.trailing_headers, name, value);
            }
        }

        record
    }

    /// Snapshot from caller-supplied headers for manual insertion.
    #[must_use]
    pub fn from_headers(source_uri: Option<&str>, headers: &HeaderMap) -> Self {
        let mut response = Response::new(());
        *response.headers_mut() = headers.clone();
        Self::from_response(source_uri, &response)
    }

    /// Every stored header other than trailers, in one map.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        extend(&mut headers, &self.response_headers);
        extend(&mut headers, &self.content_headers);
        headers
    }

    /// Merge the stored envelope onto `response`.
    ///
    /// Stored values replace any values already present under the same name.
    pub fn apply_to<B>(&self, response: &mut Response<B>) {
        if let Ok(status) = StatusCode::from_u16(self.status) {
            *response.status_mut() = status;
        }

        replace(response.headers_mut(), &self.response_headers);
        replace(response.headers_mut(), &self.content_headers);

        if !self.trailing_headers.is_empty() {
            let trailers = response
                .extensions_mut()
                .get_or_insert_with(Trailers::default);
            replace(&mut trailers.0, &self.trailing_headers);
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_json(&bytes)
    }
}

/// Headers describing the representation rather than the exchange
#[must_use]
pub fn is_content_header(name: &HeaderName) -> bool {
    name.as_str().starts_with("content-")
        || *name == EXPIRES
        || *name == LAST_MODIFIED
        || *name == ALLOW
}

fn push_value(target: &mut HeaderList, name: &HeaderName, value: &HeaderValue) {
    target
        .entry(name.as_str().to_string())
        .or_default()
        .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
}

fn extend(headers: &mut HeaderMap, list: &HeaderList) {
    for (name, values) in list {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(
                target: "hcache::cache::metadata",
                header = %name,
                "Skipping stored header with invalid name"
            );
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
}

fn replace(headers: &mut HeaderMap, list: &HeaderList) {
    for name in list.keys() {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.remove(name);
        }
    }
    extend(headers, list);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> Response<()> {
        let mut response = Response::builder()
            .status(StatusCode::NON_AUTHORITATIVE_INFORMATION)
            .header("content-type", "application/json")
            .header("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT")
            .header("set-cookie", "a=1")
            .header("set-cookie", "b=2")
            .header("etag", "\"v1\"")
            .body(())
            .unwrap_or_else(|e| panic!("response: {e}"));

        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));
        response.extensions_mut().insert(Trailers(trailers));
        response
    }

    #[test]
    fn test_splits_header_groups() {
        let record = MetadataRecord::from_response(Some("https://example/json"), &sample_response());

        assert_eq!(record.status, 203);
        assert_eq!(record.source_uri.as_deref(), Some("https://example/json"));
        assert!(record.content_headers.contains_key("content-type"));
        assert!(record.content_headers.contains_key("last-modified"));
        assert_eq!(
            record.response_headers.get("set-cookie"),
            Some(&vec!["a=1".to_string(), "b=2".to_string()])
        );
        assert_eq!(
            record.trailing_headers.get("x-checksum"),
            Some(&vec!["abc".to_string()])
        );
    }

    #[test]
    fn test_json_preserves_multiplicity() {
        let record = MetadataRecord::from_response(None, &sample_response());
        let json = record.to_json().unwrap_or_else(|e| panic!("encode: {e}"));
        let decoded = MetadataRecord::from_json(&json).unwrap_or_else(|e| panic!("decode: {e}"));
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_apply_to_rebuilds_envelope() {
        let record = MetadataRecord::from_response(None, &sample_response());
        let mut rebuilt = Response::new(());
        rebuilt
            .headers_mut()
            .insert("set-cookie", HeaderValue::from_static("stale=1"));
        record.apply_to(&mut rebuilt);

        assert_eq!(rebuilt.status(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
        let cookies: Vec<_> = rebuilt.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        let trailers = rebuilt
            .extensions()
            .get::<Trailers>()
            .unwrap_or_else(|| panic!("trailers should be restored"));
        assert_eq!(trailers.0.get("x-checksum").map(|v| v.as_bytes()), Some(&b"abc"[..]));
    }

    #[test]
    fn test_legacy_record_defaults() {
        let decoded = MetadataRecord::from_json(br#"{"response_headers":{}}"#)
            .unwrap_or_else(|e| panic!("decode: {e}"));
        assert_eq!(decoded.status, 200);
        assert!(decoded.source_uri.is_none());
    }
}
