use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

/// A Result alias where the Err case is `hcache::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents errors that can occur while fetching, storing or evicting cache entries.
pub struct Error {
    pub inner: Box<Inner>,
}

pub struct Inner {
    pub kind: Kind,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    /// Resource identifier the failing operation was working on
    pub resource: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Invalid cache directory or limits, raised at construction
    Configuration,
    /// Network failure or timeout while talking to the origin
    Transport,
    /// The origin answered with a non-success status
    Origin(StatusCode),
    /// A purge or commit lost track of its temporary files
    StorageCorruption,
    /// A purge target is held open by a reader; the entry was restored
    LockedResource,
    /// The caller cancelled the fetch
    Canceled,
    /// An operation was used on a value that cannot support it
    InvalidState,
    /// A response could not be classified into a cache outcome
    UnexpectedResponse,
    /// Filesystem failure outside of the purge protocol
    Io,
    /// Metadata sidecar could not be encoded or decoded
    Metadata,
    /// The resource identifier is not an absolute URI
    InvalidUri,
}

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: None,
                resource: None,
            }),
        }
    }

    #[must_use = "Error builder methods return a new Error and should be used"]
    pub fn with<E: Into<Box<dyn StdError + Send + Sync>>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.inner.resource = Some(resource.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Get the resource identifier associated with this error, if any
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.inner.resource.as_deref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("hcache::Error");

        f.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }

        if let Some(ref resource) = self.inner.resource {
            f.field("resource", resource);
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::Configuration => f.write_str("invalid cache configuration")?,
            Kind::Transport => f.write_str("error sending request")?,
            Kind::Origin(code) => {
                let prefix = if code.is_client_error() {
                    "HTTP status client error"
                } else if code.is_server_error() {
                    "HTTP status server error"
                } else {
                    "HTTP status not cacheable"
                };
                write!(f, "{prefix} ({code})")?;
            }
            Kind::StorageCorruption => f.write_str("cache entry storage corrupted")?,
            Kind::LockedResource => f.write_str("cache entry is locked")?,
            Kind::Canceled => f.write_str("operation canceled")?,
            Kind::InvalidState => f.write_str("invalid state")?,
            Kind::UnexpectedResponse => f.write_str("unexpected response classification")?,
            Kind::Io => f.write_str("cache i/o error")?,
            Kind::Metadata => f.write_str("cache metadata error")?,
            Kind::InvalidUri => f.write_str("invalid resource identifier")?,
        }

        if let Some(ref resource) = self.inner.resource {
            write!(f, " for {resource}")?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}
