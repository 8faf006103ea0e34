use std::error::Error as StdError;
use std::io;

use http::StatusCode;

use super::helpers::TimedOut;
use super::types::{Error, Kind};

impl Error {
    /// Returns true if the error was raised while validating configuration.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self.inner.kind, Kind::Configuration)
    }

    /// Returns true if the origin could not be reached.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport)
    }

    /// Returns true if the origin answered with a non-success status.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        matches!(self.inner.kind, Kind::Origin(_))
    }

    /// Returns the origin status code, if this is an origin error.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Kind::Origin(code) => Some(code),
            _ => None,
        }
    }

    /// Returns true if the caller cancelled the operation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.kind, Kind::Canceled)
    }

    /// Returns true if the error is related to a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }
            if let Some(hyper_err) = err.downcast_ref::<hyper::Error>()
                && hyper_err.is_timeout()
            {
                return true;
            }
            if let Some(io) = err.downcast_ref::<io::Error>()
                && io.kind() == io::ErrorKind::TimedOut
            {
                return true;
            }
            source = err.source();
        }

        false
    }

    /// Returns true if a purge target was locked and has been restored.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self.inner.kind, Kind::LockedResource)
    }

    /// Returns true if the cache directory can no longer be trusted for this entry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::StorageCorruption | Kind::UnexpectedResponse | Kind::Configuration
        )
    }

    /// Returns true if stale-if-error may substitute a stored entry for this failure.
    ///
    /// Caller cancellation never qualifies.
    #[must_use]
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport | Kind::Origin(_))
    }
}
