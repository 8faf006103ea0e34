//! HTTP date parsing and formatting utilities
//!
//! RFC 7231 `HTTP-date` handling for `Last-Modified`, `Expires` and
//! `If-Modified-Since`. All values are whole seconds since the Unix epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};

/// HTTP date parsing error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpDateParseError {
    /// Date format was not recognized by any of the supported parsers
    #[error("unrecognized HTTP date format: {0}")]
    UnrecognizedFormat(String),
    /// Date was parsed but represents a time before Unix epoch
    #[error("HTTP date before the Unix epoch: {0}")]
    BeforeEpoch(String),
}

/// Parse HTTP date string into `SystemTime` following RFC 7231 formats
///
/// Accepts IMF-fixdate, RFC 850 and asctime, then RFC 2822 as a fallback.
pub fn parse_http_date(date_str: &str) -> Result<SystemTime, HttpDateParseError> {
    let date_str = date_str.trim();

    let timestamp = DateTime::parse_from_str(date_str, "%a, %d %b %Y %H:%M:%S GMT")
        .map(|dt| dt.timestamp())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(date_str, "%a, %d %b %Y %H:%M:%S GMT")
                .map(|dt| dt.and_utc().timestamp())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(date_str, "%A, %d-%b-%y %H:%M:%S GMT")
                .map(|dt| dt.and_utc().timestamp())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(date_str, "%a %b %e %H:%M:%S %Y")
                .map(|dt| dt.and_utc().timestamp())
        })
        .or_else(|_| DateTime::parse_from_rfc2822(date_str).map(|dt| dt.timestamp()))
        .map_err(|_| HttpDateParseError::UnrecognizedFormat(date_str.to_string()))?;

    let secs = u64::try_from(timestamp)
        .map_err(|_| HttpDateParseError::BeforeEpoch(date_str.to_string()))?;
    Ok(UNIX_EPOCH + Duration::from_secs(secs))
}

/// Format `SystemTime` as HTTP date string in RFC 7231 IMF-fixdate format
pub fn fmt_http_date(time: SystemTime) -> String {
    let secs = unix_seconds(time);
    let dt = i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();

    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Whole seconds since the Unix epoch, saturating at zero for earlier instants
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Truncate an instant to whole seconds, the resolution of every HTTP date
pub fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(unix_seconds(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_imf_fixdate() {
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT")
            .unwrap_or_else(|e| panic!("IMF-fixdate should parse: {e}"));
        assert_eq!(unix_seconds(parsed), 784_111_777);
    }

    #[test]
    fn test_parse_rfc850() {
        let rfc850 = parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT")
            .unwrap_or_else(|e| panic!("RFC 850 should parse: {e}"));
        assert_eq!(unix_seconds(rfc850), 784_111_777);
    }

    #[test]
    fn test_format_round_trip() {
        let time = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let formatted = fmt_http_date(time);
        assert_eq!(formatted, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&formatted).ok(), Some(time));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_http_date("not a date"),
            Err(HttpDateParseError::UnrecognizedFormat(_))
        ));
    }
}
