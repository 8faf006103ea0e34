//! HTTP entity-tag validators
//!
//! A validator has two spellings: the wire form sent in `ETag`/`If-None-Match`
//! headers (`"tag"` or `W/"tag"`) and a path form embedded in entry filenames
//! (`S` or `W` followed by the unquoted, percent-encoded tag). Quoting is
//! normalized away, so both spellings decode to the same value.

use std::fmt;

use crate::error::{self, Result};

/// Entity tag attached to a stored entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Validator {
    /// No validator known
    #[default]
    Empty,
    /// Strong validator holding the unquoted tag
    Strong(String),
    /// Weak validator holding the unquoted tag
    Weak(String),
}

impl Validator {
    pub const EMPTY: Validator = Validator::Empty;

    /// Parse an `ETag` header value.
    #[must_use]
    pub fn from_header_value(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::Empty;
        };

        match raw.strip_prefix("W/") {
            Some(weak) => Self::Weak(unquote(weak).to_string()),
            None => Self::Strong(unquote(raw).to_string()),
        }
    }

    /// Decode the path form produced by [`Validator::path_form`].
    #[must_use]
    pub fn from_path_form(raw: &str) -> Self {
        let mut chars = raw.chars();
        let Some(marker) = chars.next() else {
            return Self::Empty;
        };

        let encoded = chars.as_str();
        let tag = urlencoding::decode(encoded)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_else(|_| encoded.to_string());

        if marker == 'W' {
            Self::Weak(tag)
        } else {
            Self::Strong(tag)
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn is_weak(&self) -> bool {
        matches!(self, Self::Weak(_))
    }

    /// The unquoted tag, if any
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Strong(tag) | Self::Weak(tag) => Some(tag),
        }
    }

    /// Header spelling of the validator.
    ///
    /// Fails with `InvalidState` on the empty validator; check [`Validator::is_empty`] first.
    pub fn wire_form(&self) -> Result<String> {
        match self {
            Self::Empty => Err(error::invalid_state("empty validator has no wire form")),
            Self::Strong(tag) => Ok(format!("\"{tag}\"")),
            Self::Weak(tag) => Ok(format!("W/\"{tag}\"")),
        }
    }

    /// Filename spelling of the validator; empty for [`Validator::Empty`].
    #[must_use]
    pub fn path_form(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Strong(tag) => format!("S{}", urlencoding::encode(tag)),
            Self::Weak(tag) => format!("W{}", urlencoding::encode(tag)),
        }
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Strong(tag) => write!(f, "\"{tag}\""),
            Self::Weak(tag) => write!(f, "W/\"{tag}\""),
        }
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw)
}
