//! Cache key derivation for resource identifiers
//!
//! A fingerprint is the lowercase hex SHA-256 of the identifier. It prefixes every
//! entry filename, so it must stay stable across processes and platforms.

use ring::digest::{SHA256, digest};

/// Length in characters of every fingerprint
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the fingerprint of a resource identifier
#[must_use]
pub fn compute(identifier: &str) -> String {
    hex::encode(digest(&SHA256, identifier.as_bytes()))
}

/// Returns true if `candidate` has the shape of a fingerprint
#[must_use]
pub fn is_fingerprint(candidate: &str) -> bool {
    candidate.len() == FINGERPRINT_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_pinned() {
        assert_eq!(
            compute("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let first = compute("https://example/json");
        let second = compute("https://example/json");
        assert_eq!(first, second);
        assert_ne!(first, compute("https://example/json?page=2"));
        assert!(is_fingerprint(&first));
    }

    #[test]
    fn test_is_fingerprint_rejects_other_shapes() {
        assert!(!is_fingerprint("abc"));
        assert!(!is_fingerprint(&"G".repeat(FINGERPRINT_LEN)));
    }
}
