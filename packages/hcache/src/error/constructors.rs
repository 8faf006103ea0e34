use http::StatusCode;

use super::types::{Error, Kind};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Creates an `Error` for an invalid configuration.
pub fn configuration<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Configuration).with(e.into())
}

/// Creates an `Error` for a transport failure.
pub fn transport<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Transport).with(e.into())
}

/// Creates an `Error` for a transport timeout.
pub fn timeout() -> Error {
    Error::new(Kind::Transport).with(super::helpers::TimedOut)
}

/// Creates an `Error` for a non-success origin status.
pub fn origin(resource: &str, status: StatusCode) -> Error {
    Error::new(Kind::Origin(status)).with_resource(resource)
}

/// Creates an `Error` for a cancelled fetch.
pub fn canceled(resource: &str) -> Error {
    Error::new(Kind::Canceled)
        .with(super::helpers::OperationCanceled)
        .with_resource(resource)
}

/// Creates an `Error` for an entry whose files could not be restored.
pub fn storage_corruption<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::StorageCorruption).with(e.into())
}

/// Creates an `Error` for a purge target held open elsewhere.
pub fn locked_resource<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::LockedResource).with(e.into())
}

pub fn invalid_state<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::InvalidState).with(e.into())
}

pub fn unexpected_response(resource: &str, status: StatusCode) -> Error {
    Error::new(Kind::UnexpectedResponse)
        .with(format!("no cache outcome for status {status}"))
        .with_resource(resource)
}

pub fn invalid_uri<E: Into<BoxError>>(resource: &str, e: E) -> Error {
    Error::new(Kind::InvalidUri).with(e.into()).with_resource(resource)
}

pub fn io<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Io).with(e.into())
}

pub fn metadata<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Metadata).with(e.into())
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        metadata(err)
    }
}
